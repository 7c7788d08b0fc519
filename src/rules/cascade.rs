use crate::{
    error::{CoreError, CoreResult},
    models::{
        Club, ClubId, ClubRole, Event, EventId, Membership, MembershipStatus,
        RegistrationStatus, User, UserId,
    },
    rules::roles,
};
use serde::Serialize;

/// Precondition checked inside the cascade's transaction, before any write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeGuard {
    /// The account exists and leads no live club.
    AccountDeletable { user_id: UserId },
    /// The club is live and `user_id` is its active leader.
    LeaderOf { club_id: ClubId, user_id: UserId },
    /// The event is live and hosted by `user_id`.
    HostOf { event_id: EventId, user_id: UserId },
}

/// One bulk update. These bypass the per-row transition rules: the parent
/// aggregate is going away, so every dependent row is forced to `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeStep {
    MembershipsOfUser { user_id: UserId, status: MembershipStatus },
    RegistrationsOfUser { user_id: UserId, status: RegistrationStatus },
    RegistrationsOfHostedEvents { user_id: UserId, status: RegistrationStatus },
    HostedEvents { user_id: UserId },
    MembershipsOfClub { club_id: ClubId, status: MembershipStatus },
    RegistrationsOfClubEvents { club_id: ClubId, status: RegistrationStatus },
    ClubEvents { club_id: ClubId },
    RegistrationsOfEvent { event_id: EventId, status: RegistrationStatus },
    Event { event_id: EventId },
    Club { club_id: ClubId },
    User { user_id: UserId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePlan {
    pub guard: CascadeGuard,
    pub steps: Vec<CascadeStep>,
}

impl CascadePlan {
    pub fn delete_user(user_id: UserId) -> Self {
        Self {
            guard: CascadeGuard::AccountDeletable { user_id },
            steps: vec![
                CascadeStep::MembershipsOfUser {
                    user_id,
                    status: MembershipStatus::Left,
                },
                CascadeStep::RegistrationsOfUser {
                    user_id,
                    status: RegistrationStatus::Canceled,
                },
                CascadeStep::RegistrationsOfHostedEvents {
                    user_id,
                    status: RegistrationStatus::Canceled,
                },
                CascadeStep::HostedEvents { user_id },
                CascadeStep::User { user_id },
            ],
        }
    }

    pub fn delete_club(caller: UserId, club_id: ClubId) -> Self {
        Self {
            guard: CascadeGuard::LeaderOf {
                club_id,
                user_id: caller,
            },
            steps: vec![
                CascadeStep::MembershipsOfClub {
                    club_id,
                    status: MembershipStatus::Canceled,
                },
                CascadeStep::RegistrationsOfClubEvents {
                    club_id,
                    status: RegistrationStatus::Canceled,
                },
                CascadeStep::ClubEvents { club_id },
                CascadeStep::Club { club_id },
            ],
        }
    }

    pub fn delete_event(host: UserId, event_id: EventId) -> Self {
        Self {
            guard: CascadeGuard::HostOf {
                event_id,
                user_id: host,
            },
            steps: vec![
                CascadeStep::RegistrationsOfEvent {
                    event_id,
                    status: RegistrationStatus::Canceled,
                },
                CascadeStep::Event { event_id },
            ],
        }
    }
}

/// Rows touched by a committed cascade.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub memberships: usize,
    pub registrations: usize,
    pub events: usize,
    pub clubs: usize,
    pub users: usize,
}

impl CascadeReport {
    pub fn record(&mut self, step: &CascadeStep, rows: usize) {
        match step {
            CascadeStep::MembershipsOfUser { .. } | CascadeStep::MembershipsOfClub { .. } => {
                self.memberships += rows
            }
            CascadeStep::RegistrationsOfUser { .. }
            | CascadeStep::RegistrationsOfHostedEvents { .. }
            | CascadeStep::RegistrationsOfClubEvents { .. }
            | CascadeStep::RegistrationsOfEvent { .. } => self.registrations += rows,
            CascadeStep::HostedEvents { .. }
            | CascadeStep::ClubEvents { .. }
            | CascadeStep::Event { .. } => self.events += rows,
            CascadeStep::Club { .. } => self.clubs += rows,
            CascadeStep::User { .. } => self.users += rows,
        }
    }
}

/// An account that leads a live club must hand over leadership (or delete
/// the club) before it can be removed.
pub fn check_account_deletable(user: Option<&User>, led_live_clubs: usize) -> CoreResult<()> {
    match user {
        Some(u) if !u.is_deleted => {}
        _ => return Err(CoreError::not_found("user not found")),
    }
    if led_live_clubs > 0 {
        return Err(CoreError::invalid(
            "transfer leadership of your clubs before deleting the account",
        ));
    }
    Ok(())
}

pub fn check_club_deletable(club: Option<&Club>, caller: Option<&Membership>) -> CoreResult<()> {
    match club {
        Some(c) if !c.is_deleted => {}
        _ => return Err(CoreError::not_found("club not found")),
    }
    roles::require_leader(caller).map(|_| ())
}

pub fn check_event_deletable(event: Option<&Event>, caller: UserId) -> CoreResult<()> {
    let event = match event {
        Some(e) if !e.is_deleted => e,
        _ => return Err(CoreError::not_found("event not found")),
    };
    if event.host_id != caller {
        return Err(CoreError::invalid("only the event host can delete it"));
    }
    Ok(())
}

/// Counts the live clubs `memberships` make their user the leader of.
pub fn led_live_clubs<'a>(
    memberships: impl IntoIterator<Item = &'a Membership>,
    club_is_live: impl Fn(ClubId) -> bool,
) -> usize {
    memberships
        .into_iter()
        .filter(|m| m.is_active() && m.role == ClubRole::Leader && club_is_live(m.club_id))
        .count()
}
