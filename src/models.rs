use crate::schema::*;
use chrono::NaiveDateTime;
use diesel::{
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    pg::{Pg, PgValue},
    prelude::*,
    serialize::{self, IsNull, Output, ToSql},
    sql_types::Text,
};
use serde::{Deserialize, Serialize};
use std::io::Write;

pub type UserId = i64;
pub type ClubId = i64;
pub type EventId = i64;
pub type MembershipId = i64;
pub type RegistrationId = i64;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

/// Stores a fieldless enum as its upper-case name in a text column.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
                Ok(std::str::from_utf8(value.as_bytes())?.parse()?)
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClubRole {
    Leader,
    Manager,
    Member,
}

text_enum!(ClubRole {
    Leader => "LEADER",
    Manager => "MANAGER",
    Member => "MEMBER",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipStatus {
    Pending,
    Active,
    Canceled,
    Rejected,
    Left,
}

text_enum!(MembershipStatus {
    Pending => "PENDING",
    Active => "ACTIVE",
    Canceled => "CANCELED",
    Rejected => "REJECTED",
    Left => "LEFT",
});

impl MembershipStatus {
    /// Terminal rows may be reactivated by a new application.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Rejected | Self::Left)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    Confirmed,
    Canceled,
    Rejected,
}

text_enum!(RegistrationStatus {
    Confirmed => "CONFIRMED",
    Canceled => "CANCELED",
    Rejected => "REJECTED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    Global,
    Club,
}

text_enum!(Scope {
    Global => "GLOBAL",
    Club => "CLUB",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClubType {
    Club,
    Crew,
}

text_enum!(ClubType {
    Club => "CLUB",
    Crew => "CREW",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Workshop,
    Battle,
    Jam,
    Performance,
}

text_enum!(EventKind {
    Workshop => "WORKSHOP",
    Battle => "BATTLE",
    Jam => "JAM",
    Performance => "PERFORMANCE",
});

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub nickname: String,
    pub password_hash: String,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub nickname: String,
    pub password_hash: String,
}

/// Public view of an account, never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: UserId,
    pub email: String,
    pub nickname: String,
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            nickname: user.nickname.clone(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = clubs)]
#[serde(rename_all = "camelCase")]
pub struct Club {
    pub id: ClubId,
    pub club_name: String,
    pub club_type: ClubType,
    pub intro: String,
    pub description: String,
    pub location_name: String,
    #[serde(skip)]
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = clubs)]
#[serde(rename_all = "camelCase")]
pub struct NewClub {
    pub club_name: String,
    pub club_type: ClubType,
    pub intro: String,
    pub description: String,
    pub location_name: String,
}

/// Descriptive club fields a manager may change. Name and type stay fixed.
#[derive(Debug, Clone, Default, AsChangeset, Deserialize)]
#[diesel(table_name = clubs)]
#[serde(rename_all = "camelCase")]
pub struct ClubEdit {
    pub intro: Option<String>,
    pub description: Option<String>,
    pub location_name: Option<String>,
}

impl ClubEdit {
    pub fn is_empty(&self) -> bool {
        self.intro.is_none() && self.description.is_none() && self.location_name.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubRef {
    pub id: ClubId,
    pub exists: bool,
    pub is_deleted: bool,
}

impl ClubRef {
    pub const fn is_live(&self) -> bool {
        self.exists && !self.is_deleted
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = events)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub host_id: UserId,
    pub scope: Scope,
    pub club_id: Option<ClubId>,
    pub kind: EventKind,
    pub title: String,
    pub content: String,
    pub location_name: Option<String>,
    pub capacity: i32,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    #[serde(skip)]
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = events)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    #[serde(skip)]
    pub host_id: UserId,
    pub scope: Scope,
    pub club_id: Option<ClubId>,
    pub kind: EventKind,
    pub title: String,
    pub content: String,
    pub location_name: Option<String>,
    pub capacity: i32,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
}

/// Event fields the host may change. Capacity, scope and club stay fixed.
#[derive(Debug, Clone, Default, AsChangeset, Deserialize)]
#[diesel(table_name = events)]
#[serde(rename_all = "camelCase")]
pub struct EventEdit {
    pub title: Option<String>,
    pub content: Option<String>,
    pub location_name: Option<String>,
    pub starts_at: Option<NaiveDateTime>,
    pub ends_at: Option<NaiveDateTime>,
}

impl EventEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.location_name.is_none()
            && self.starts_at.is_none()
            && self.ends_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRef {
    pub id: EventId,
    pub capacity: i32,
    pub host_id: UserId,
    pub exists: bool,
}

impl EventRef {
    pub fn missing(id: EventId) -> Self {
        Self {
            id,
            capacity: 0,
            host_id: 0,
            exists: false,
        }
    }
}

impl From<&Event> for EventRef {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            capacity: event.capacity,
            host_id: event.host_id,
            exists: !event.is_deleted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Serialize)]
#[diesel(table_name = club_memberships)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: MembershipId,
    pub user_id: UserId,
    pub club_id: ClubId,
    pub role: ClubRole,
    pub status: MembershipStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Membership {
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = club_memberships)]
pub struct NewMembership {
    pub user_id: UserId,
    pub club_id: ClubId,
    pub role: ClubRole,
    pub status: MembershipStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Serialize)]
#[diesel(table_name = event_registrations)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: RegistrationId,
    pub user_id: UserId,
    pub event_id: EventId,
    pub status: RegistrationStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = event_registrations)]
pub struct NewRegistration {
    pub user_id: UserId,
    pub event_id: EventId,
    pub status: RegistrationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_round_trip_through_their_column_text() {
        for status in [
            MembershipStatus::Pending,
            MembershipStatus::Active,
            MembershipStatus::Canceled,
            MembershipStatus::Rejected,
            MembershipStatus::Left,
        ] {
            assert_eq!(status.as_str().parse::<MembershipStatus>().unwrap(), status);
        }
        assert!("ENROLLED".parse::<RegistrationStatus>().is_err());
    }

    #[test]
    fn only_closed_memberships_are_terminal() {
        assert!(!MembershipStatus::Pending.is_terminal());
        assert!(!MembershipStatus::Active.is_terminal());
        assert!(MembershipStatus::Left.is_terminal());
        assert!(MembershipStatus::Rejected.is_terminal());
    }
}
