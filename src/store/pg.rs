//! Postgres store.
//!
//! Every unit of work runs in one transaction. Registration units lock the
//! event row with `SELECT .. FOR UPDATE` before counting and hold the
//! registrant's user row `FOR SHARE`. Membership units hold the club and
//! applicant rows `FOR SHARE` and lock the target's and actor's rows in
//! `user_id` order. Cascades lock the rows their guard inspects plus every
//! event they touch before issuing bulk updates, so a registration unit is
//! either committed before the cascade reads or sees the deleted parent.

use crate::{
    error::{CoreError, CoreResult},
    models::{
        Club, ClubEdit, ClubId, ClubRole, Event, EventEdit, EventId, EventRef, Membership,
        MembershipStatus, NewClub, NewEvent, NewMembership, NewRegistration, NewUser, Registration,
        RegistrationStatus, User, UserId,
    },
    rules::{
        cascade::{self, CascadeGuard, CascadePlan, CascadeReport, CascadeStep},
        membership::{self, MembershipRequest, MembershipWrite},
        registration::{self, RegistrationRequest, RegistrationSnapshot, RegistrationWrite},
    },
    schema::*,
    store::Store,
    DbPool,
};
use async_trait::async_trait;
use deadpool::managed::Object;
use diesel::{prelude::*, result::QueryResult};
use diesel_async::{
    pooled_connection::AsyncDieselConnectionManager, AsyncConnection, AsyncPgConnection,
    RunQueryDsl,
};
use scoped_futures::ScopedFutureExt;

type Pooled = Object<AsyncDieselConnectionManager<AsyncPgConnection>>;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> CoreResult<Pooled> {
        self.pool
            .get()
            .await
            .map_err(|e| anyhow::anyhow!("failed to get a database connection: {e}").into())
    }

    async fn registration_tx(&self, request: RegistrationRequest) -> CoreResult<Registration> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        conn.transaction::<_, CoreError, _>(|conn| {
            async move {
                // user before event, the order cascades take them in
                let user_live = live_for_share(conn, Parent::User(request.user_id)).await?;
                let event = events::table
                    .find(request.event_id)
                    .for_update()
                    .get_result::<Event>(conn)
                    .await
                    .optional()?;
                tracing::debug!(event_id = request.event_id, "event lock acquired");

                let confirmed = event_registrations::table
                    .filter(event_registrations::event_id.eq(request.event_id))
                    .filter(event_registrations::status.eq(RegistrationStatus::Confirmed))
                    .count()
                    .get_result::<i64>(conn)
                    .await?;
                let existing = event_registrations::table
                    .filter(event_registrations::event_id.eq(request.event_id))
                    .filter(event_registrations::user_id.eq(request.user_id))
                    .first::<Registration>(conn)
                    .await
                    .optional()?;

                let snapshot = RegistrationSnapshot {
                    event: event
                        .as_ref()
                        .map_or_else(|| EventRef::missing(request.event_id), EventRef::from),
                    confirmed,
                    existing: existing.as_ref(),
                    user_live,
                };

                match registration::decide(&request, &snapshot)? {
                    write @ RegistrationWrite::Insert => {
                        diesel::insert_into(event_registrations::table)
                            .values(NewRegistration {
                                user_id: request.user_id,
                                event_id: request.event_id,
                                status: write.status(),
                            })
                            .on_conflict((
                                event_registrations::user_id,
                                event_registrations::event_id,
                            ))
                            .do_nothing()
                            .get_result::<Registration>(conn)
                            .await
                            .optional()?
                            .ok_or_else(|| CoreError::conflict("already registered for this event"))
                    }
                    RegistrationWrite::Update { id, status } => {
                        Ok(diesel::update(event_registrations::table.find(id))
                            .set(event_registrations::status.eq(status))
                            .get_result::<Registration>(conn)
                            .await?)
                    }
                }
            }
            .scope_boxed()
        })
        .await
    }
}

async fn write_membership(
    conn: &mut AsyncPgConnection,
    user_id: UserId,
    club_id: ClubId,
    write: MembershipWrite,
) -> CoreResult<Membership> {
    match write {
        MembershipWrite::Insert { role, status } => diesel::insert_into(club_memberships::table)
            .values(NewMembership {
                user_id,
                club_id,
                role,
                status,
            })
            .on_conflict((club_memberships::user_id, club_memberships::club_id))
            .do_nothing()
            .get_result::<Membership>(conn)
            .await
            .optional()?
            .ok_or_else(|| CoreError::conflict("already applied to this club")),
        MembershipWrite::Update { id, role, status } => {
            Ok(diesel::update(club_memberships::table.find(id))
                .set((
                    club_memberships::role.eq(role),
                    club_memberships::status.eq(status),
                ))
                .get_result::<Membership>(conn)
                .await?)
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Parent {
    Club(ClubId),
    User(UserId),
}

/// Takes `FOR SHARE` on a parent row and reports whether it is live.
async fn live_for_share(conn: &mut AsyncPgConnection, parent: Parent) -> QueryResult<bool> {
    let deleted = match parent {
        Parent::Club(id) => {
            clubs::table
                .find(id)
                .select(clubs::is_deleted)
                .for_share()
                .get_result::<bool>(conn)
                .await
        }
        Parent::User(id) => {
            users::table
                .find(id)
                .select(users::is_deleted)
                .for_share()
                .get_result::<bool>(conn)
                .await
        }
    };
    Ok(deleted.optional()?.map_or(false, |deleted| !deleted))
}

/// Locks the event rows the plan deletes, in id order. A registration unit
/// holding one of them commits first, and one that starts later waits for
/// the cascade and then sees the deleted event.
async fn lock_events(conn: &mut AsyncPgConnection, plan: &CascadePlan) -> QueryResult<Vec<EventId>> {
    match plan.guard {
        CascadeGuard::AccountDeletable { user_id } => {
            events::table
                .filter(events::host_id.eq(user_id))
                .select(events::id)
                .order(events::id)
                .for_update()
                .load(conn)
                .await
        }
        CascadeGuard::LeaderOf { club_id, .. } => {
            events::table
                .filter(events::club_id.eq(club_id))
                .select(events::id)
                .order(events::id)
                .for_update()
                .load(conn)
                .await
        }
        CascadeGuard::HostOf { event_id, .. } => {
            events::table
                .find(event_id)
                .select(events::id)
                .for_update()
                .load(conn)
                .await
        }
    }
}

async fn check_guard(conn: &mut AsyncPgConnection, guard: &CascadeGuard) -> CoreResult<()> {
    match *guard {
        CascadeGuard::AccountDeletable { user_id } => {
            let user = users::table
                .find(user_id)
                .for_update()
                .get_result::<User>(conn)
                .await
                .optional()?;
            let led = club_memberships::table
                .filter(club_memberships::user_id.eq(user_id))
                .filter(club_memberships::role.eq(ClubRole::Leader))
                .for_update()
                .load::<Membership>(conn)
                .await?;
            let live = clubs::table
                .filter(clubs::id.eq_any(led.iter().map(|m| m.club_id).collect::<Vec<_>>()))
                .filter(clubs::is_deleted.eq(false))
                .select(clubs::id)
                .load::<ClubId>(conn)
                .await?;
            cascade::check_account_deletable(
                user.as_ref(),
                cascade::led_live_clubs(&led, |id| live.contains(&id)),
            )
        }
        CascadeGuard::LeaderOf { club_id, user_id } => {
            let club = clubs::table
                .find(club_id)
                .for_update()
                .get_result::<Club>(conn)
                .await
                .optional()?;
            let caller = club_memberships::table
                .filter(club_memberships::club_id.eq(club_id))
                .filter(club_memberships::user_id.eq(user_id))
                .for_update()
                .get_result::<Membership>(conn)
                .await
                .optional()?;
            cascade::check_club_deletable(club.as_ref(), caller.as_ref())
        }
        CascadeGuard::HostOf { event_id, user_id } => {
            let event = events::table
                .find(event_id)
                .for_update()
                .get_result::<Event>(conn)
                .await
                .optional()?;
            cascade::check_event_deletable(event.as_ref(), user_id)
        }
    }
}

/// Rows already in the target state are left alone, so the counts only cover
/// rows the cascade actually changed.
async fn apply_step(conn: &mut AsyncPgConnection, step: &CascadeStep) -> QueryResult<usize> {
    use crate::schema::{club_memberships as cm, event_registrations as er};

    match *step {
        CascadeStep::MembershipsOfUser { user_id, status } => {
            diesel::update(cm::table.filter(cm::user_id.eq(user_id)).filter(cm::status.ne(status)))
                .set(cm::status.eq(status))
                .execute(conn)
                .await
        }
        CascadeStep::RegistrationsOfUser { user_id, status } => {
            diesel::update(er::table.filter(er::user_id.eq(user_id)).filter(er::status.ne(status)))
                .set(er::status.eq(status))
                .execute(conn)
                .await
        }
        CascadeStep::RegistrationsOfHostedEvents { user_id, status } => {
            let hosted = events::table
                .filter(events::host_id.eq(user_id))
                .select(events::id);
            diesel::update(er::table.filter(er::event_id.eq_any(hosted)).filter(er::status.ne(status)))
                .set(er::status.eq(status))
                .execute(conn)
                .await
        }
        CascadeStep::HostedEvents { user_id } => {
            diesel::update(
                events::table
                    .filter(events::host_id.eq(user_id))
                    .filter(events::is_deleted.eq(false)),
            )
            .set(events::is_deleted.eq(true))
            .execute(conn)
            .await
        }
        CascadeStep::MembershipsOfClub { club_id, status } => {
            diesel::update(cm::table.filter(cm::club_id.eq(club_id)).filter(cm::status.ne(status)))
                .set(cm::status.eq(status))
                .execute(conn)
                .await
        }
        CascadeStep::RegistrationsOfClubEvents { club_id, status } => {
            let under_club = events::table
                .filter(events::club_id.eq(club_id))
                .select(events::id);
            diesel::update(er::table.filter(er::event_id.eq_any(under_club)).filter(er::status.ne(status)))
                .set(er::status.eq(status))
                .execute(conn)
                .await
        }
        CascadeStep::ClubEvents { club_id } => {
            diesel::update(
                events::table
                    .filter(events::club_id.eq(club_id))
                    .filter(events::is_deleted.eq(false)),
            )
            .set(events::is_deleted.eq(true))
            .execute(conn)
            .await
        }
        CascadeStep::RegistrationsOfEvent { event_id, status } => {
            diesel::update(er::table.filter(er::event_id.eq(event_id)).filter(er::status.ne(status)))
                .set(er::status.eq(status))
                .execute(conn)
                .await
        }
        CascadeStep::Event { event_id } => {
            diesel::update(events::table.find(event_id).filter(events::is_deleted.eq(false)))
                .set(events::is_deleted.eq(true))
                .execute(conn)
                .await
        }
        CascadeStep::Club { club_id } => {
            diesel::update(clubs::table.find(club_id).filter(clubs::is_deleted.eq(false)))
                .set(clubs::is_deleted.eq(true))
                .execute(conn)
                .await
        }
        CascadeStep::User { user_id } => {
            diesel::update(users::table.find(user_id).filter(users::is_deleted.eq(false)))
                .set(users::is_deleted.eq(true))
                .execute(conn)
                .await
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, new: NewUser) -> CoreResult<User> {
        let conn = &mut self.conn().await?;

        diesel::insert_into(users::table)
            .values(new)
            .on_conflict_do_nothing()
            .get_result::<User>(conn)
            .await
            .optional()?
            .ok_or_else(|| CoreError::conflict("email or nickname is already in use"))
    }

    async fn find_user(&self, id: UserId) -> CoreResult<Option<User>> {
        let conn = &mut self.conn().await?;

        Ok(users::table.find(id).first(conn).await.optional()?)
    }

    async fn find_user_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        let conn = &mut self.conn().await?;

        Ok(users::table
            .filter(users::email.eq(email))
            .first(conn)
            .await
            .optional()?)
    }

    async fn set_password_hash(&self, id: UserId, password_hash: String) -> CoreResult<()> {
        let conn = &mut self.conn().await?;

        let rows = diesel::update(users::table.find(id))
            .set(users::password_hash.eq(password_hash))
            .execute(conn)
            .await?;
        if rows == 0 {
            return Err(CoreError::not_found("user not found"));
        }
        Ok(())
    }

    async fn set_nickname(&self, id: UserId, nickname: String) -> CoreResult<User> {
        let conn = &mut self.conn().await?;

        let updated = diesel::update(users::table.find(id).filter(users::is_deleted.eq(false)))
            .set(users::nickname.eq(nickname))
            .get_result::<User>(conn)
            .await;
        match updated.optional() {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(CoreError::not_found("user not found")),
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => Err(CoreError::conflict("nickname is already in use")),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_club(&self, new: NewClub, leader_id: UserId) -> CoreResult<(Club, Membership)> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        conn.transaction::<_, CoreError, _>(|conn| {
            async move {
                let club = diesel::insert_into(clubs::table)
                    .values(new)
                    .on_conflict(clubs::club_name)
                    .do_nothing()
                    .get_result::<Club>(conn)
                    .await
                    .optional()?
                    .ok_or_else(|| CoreError::conflict("club name is already in use"))?;
                let leader = write_membership(
                    conn,
                    leader_id,
                    club.id,
                    MembershipWrite::Insert {
                        role: ClubRole::Leader,
                        status: MembershipStatus::Active,
                    },
                )
                .await?;
                Ok((club, leader))
            }
            .scope_boxed()
        })
        .await
    }

    async fn find_club(&self, id: ClubId) -> CoreResult<Option<Club>> {
        let conn = &mut self.conn().await?;

        Ok(clubs::table.find(id).first(conn).await.optional()?)
    }

    async fn update_club(&self, id: ClubId, edit: ClubEdit) -> CoreResult<Club> {
        let conn = &mut self.conn().await?;

        diesel::update(clubs::table.find(id).filter(clubs::is_deleted.eq(false)))
            .set(edit)
            .get_result::<Club>(conn)
            .await
            .optional()?
            .ok_or_else(|| CoreError::not_found("club not found"))
    }

    async fn insert_event(&self, new: NewEvent) -> CoreResult<Event> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        conn.transaction::<_, CoreError, _>(|conn| {
            async move {
                if let Some(club_id) = new.club_id {
                    if !live_for_share(conn, Parent::Club(club_id)).await? {
                        return Err(CoreError::not_found("club not found"));
                    }
                }
                Ok(diesel::insert_into(events::table)
                    .values(new)
                    .get_result(conn)
                    .await?)
            }
            .scope_boxed()
        })
        .await
    }

    async fn find_event(&self, id: EventId) -> CoreResult<Option<Event>> {
        let conn = &mut self.conn().await?;

        Ok(events::table.find(id).first(conn).await.optional()?)
    }

    async fn update_event(&self, id: EventId, edit: EventEdit) -> CoreResult<Event> {
        let conn = &mut self.conn().await?;

        diesel::update(events::table.find(id).filter(events::is_deleted.eq(false)))
            .set(edit)
            .get_result::<Event>(conn)
            .await
            .optional()?
            .ok_or_else(|| CoreError::not_found("event not found"))
    }

    async fn find_membership(&self, user_id: UserId, club_id: ClubId) -> CoreResult<Option<Membership>> {
        let conn = &mut self.conn().await?;

        Ok(club_memberships::table
            .filter(club_memberships::user_id.eq(user_id))
            .filter(club_memberships::club_id.eq(club_id))
            .first(conn)
            .await
            .optional()?)
    }

    async fn memberships_of_club(
        &self,
        club_id: ClubId,
        status: MembershipStatus,
    ) -> CoreResult<Vec<Membership>> {
        let conn = &mut self.conn().await?;

        Ok(club_memberships::table
            .filter(club_memberships::club_id.eq(club_id))
            .filter(club_memberships::status.eq(status))
            .order(club_memberships::id)
            .load(conn)
            .await?)
    }

    async fn memberships_of_user(
        &self,
        user_id: UserId,
        statuses: &[MembershipStatus],
    ) -> CoreResult<Vec<Membership>> {
        let conn = &mut self.conn().await?;

        Ok(club_memberships::table
            .filter(club_memberships::user_id.eq(user_id))
            .filter(club_memberships::status.eq_any(statuses.to_vec()))
            .order(club_memberships::id)
            .load(conn)
            .await?)
    }

    async fn run_membership(&self, request: MembershipRequest) -> CoreResult<Membership> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        conn.transaction::<_, CoreError, _>(|conn| {
            async move {
                let club_live = live_for_share(conn, Parent::Club(request.club_id)).await?;
                let applicant_live = live_for_share(conn, Parent::User(request.user_id)).await?;
                membership::check_parents(&request, club_live, applicant_live)?;

                let actor_id = request.command.actor();
                let mut ids = vec![request.user_id];
                ids.extend(actor_id.filter(|id| *id != request.user_id));

                let rows = club_memberships::table
                    .filter(club_memberships::club_id.eq(request.club_id))
                    .filter(club_memberships::user_id.eq_any(ids))
                    .order(club_memberships::user_id)
                    .for_update()
                    .load::<Membership>(conn)
                    .await?;
                let target = rows.iter().find(|m| m.user_id == request.user_id);
                let actor = actor_id.and_then(|id| rows.iter().find(|m| m.user_id == id));

                let decision = membership::decide(&request, target, actor)?;
                if let (Some(write), Some(actor_id)) = (decision.actor, actor_id) {
                    write_membership(conn, actor_id, request.club_id, write).await?;
                }
                write_membership(conn, request.user_id, request.club_id, decision.target).await
            }
            .scope_boxed()
        })
        .await
    }

    async fn find_registration(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> CoreResult<Option<Registration>> {
        let conn = &mut self.conn().await?;

        Ok(event_registrations::table
            .filter(event_registrations::user_id.eq(user_id))
            .filter(event_registrations::event_id.eq(event_id))
            .first(conn)
            .await
            .optional()?)
    }

    async fn registrations_of_user(&self, user_id: UserId) -> CoreResult<Vec<Registration>> {
        let conn = &mut self.conn().await?;

        Ok(event_registrations::table
            .filter(event_registrations::user_id.eq(user_id))
            .order(event_registrations::id)
            .load(conn)
            .await?)
    }

    async fn registrations_of_event(&self, event_id: EventId) -> CoreResult<Vec<Registration>> {
        let conn = &mut self.conn().await?;

        Ok(event_registrations::table
            .filter(event_registrations::event_id.eq(event_id))
            .order(event_registrations::id)
            .load(conn)
            .await?)
    }

    async fn count_confirmed(&self, event_id: EventId) -> CoreResult<i64> {
        let conn = &mut self.conn().await?;

        Ok(event_registrations::table
            .filter(event_registrations::event_id.eq(event_id))
            .filter(event_registrations::status.eq(RegistrationStatus::Confirmed))
            .count()
            .get_result(conn)
            .await?)
    }

    async fn run_registration(&self, request: RegistrationRequest) -> CoreResult<Registration> {
        // the transaction runs to completion even if the caller goes away
        let store = self.clone();
        tokio::spawn(async move { store.registration_tx(request).await })
            .await
            .map_err(|e| anyhow::anyhow!("registration task failed: {e}"))?
    }

    async fn run_cascade(&self, plan: CascadePlan) -> CoreResult<CascadeReport> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        conn.transaction::<_, CoreError, _>(|conn| {
            async move {
                check_guard(conn, &plan.guard).await?;
                let locked = lock_events(conn, &plan).await?;
                tracing::debug!(events = locked.len(), "cascade event locks acquired");

                let mut report = CascadeReport::default();
                for step in &plan.steps {
                    let rows = apply_step(conn, step)
                        .await
                        .map_err(|e| CoreError::Fatal(format!("{step:?}: {e}").into()))?;
                    report.record(step, rows);
                }
                Ok(report)
            }
            .scope_boxed()
        })
        .await
    }
}
