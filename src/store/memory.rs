//! In-process store with the same locking contract as `PgStore`.
//!
//! Tables sit behind one short-lived mutex that is never held across an
//! await. Registration units additionally hold a per-event async mutex for
//! their whole count-then-write sequence, and yield between the two the way
//! a database round trip would, so the per-event lock is what keeps them
//! from overbooking. Cascades take the write side of a gate that every
//! registration unit enters shared, which makes them atomic with respect to
//! in-flight registrations.

use crate::{
    error::{CoreError, CoreResult},
    models::{
        Club, ClubEdit, ClubId, ClubRole, Event, EventEdit, EventId, EventRef, Membership,
        MembershipId, MembershipStatus, NewClub, NewEvent, NewUser, Registration, RegistrationId,
        RegistrationStatus, User, UserId,
    },
    rules::{
        cascade::{self, CascadeGuard, CascadePlan, CascadeReport, CascadeStep},
        membership::{self, MembershipRequest, MembershipWrite},
        registration::{self, RegistrationRequest, RegistrationSnapshot, RegistrationWrite},
    },
    store::Store,
};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};

#[derive(Debug, Default, Clone)]
struct Tables {
    next_id: i64,
    users: BTreeMap<UserId, User>,
    clubs: BTreeMap<ClubId, Club>,
    events: BTreeMap<EventId, Event>,
    memberships: BTreeMap<MembershipId, Membership>,
    registrations: BTreeMap<RegistrationId, Registration>,
    // mirror the unique (user, parent) indexes
    membership_keys: HashMap<(UserId, ClubId), MembershipId>,
    registration_keys: HashMap<(UserId, EventId), RegistrationId>,
    by_event: HashMap<EventId, Vec<RegistrationId>>,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn poisoned<T>(_: PoisonError<T>) -> CoreError {
    CoreError::Internal(anyhow::anyhow!("memory store lock poisoned"))
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn membership(&self, user_id: UserId, club_id: ClubId) -> Option<&Membership> {
        self.membership_keys
            .get(&(user_id, club_id))
            .and_then(|id| self.memberships.get(id))
    }

    fn registration(&self, user_id: UserId, event_id: EventId) -> Option<&Registration> {
        self.registration_keys
            .get(&(user_id, event_id))
            .and_then(|id| self.registrations.get(id))
    }

    fn registrations_of_event(&self, event_id: EventId) -> impl Iterator<Item = &Registration> {
        self.by_event
            .get(&event_id)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.registrations.get(id))
    }

    fn confirmed(&self, event_id: EventId) -> i64 {
        let n = self
            .registrations_of_event(event_id)
            .filter(|r| r.status == RegistrationStatus::Confirmed)
            .count();
        i64::try_from(n).unwrap_or(i64::MAX)
    }

    fn club_is_live(&self, club_id: ClubId) -> bool {
        self.clubs.get(&club_id).map_or(false, |c| !c.is_deleted)
    }

    fn user_is_live(&self, user_id: UserId) -> bool {
        self.users.get(&user_id).map_or(false, |u| !u.is_deleted)
    }

    fn write_membership(
        &mut self,
        user_id: UserId,
        club_id: ClubId,
        write: MembershipWrite,
    ) -> CoreResult<Membership> {
        let (id, role) = match write {
            MembershipWrite::Insert { role, .. } => (None, role),
            MembershipWrite::Update { id, role, .. } => (Some(id), role),
        };
        if role == ClubRole::Leader
            && self
                .memberships
                .values()
                .any(|m| m.club_id == club_id && m.role == ClubRole::Leader && Some(m.id) != id)
        {
            return Err(CoreError::conflict("the club already has a leader"));
        }

        match write {
            MembershipWrite::Insert { role, status } => {
                if self.membership(user_id, club_id).is_some() {
                    return Err(CoreError::conflict("already applied to this club"));
                }
                let id = self.next_id();
                let at = now();
                let row = Membership {
                    id,
                    user_id,
                    club_id,
                    role,
                    status,
                    created_at: at,
                    updated_at: at,
                };
                self.memberships.insert(id, row.clone());
                self.membership_keys.insert((user_id, club_id), id);
                Ok(row)
            }
            MembershipWrite::Update { id, role, status } => {
                let row = self
                    .memberships
                    .get_mut(&id)
                    .ok_or_else(|| CoreError::not_found("membership not found"))?;
                row.role = role;
                row.status = status;
                row.updated_at = now();
                Ok(row.clone())
            }
        }
    }

    fn write_registration(
        &mut self,
        request: &RegistrationRequest,
        write: RegistrationWrite,
    ) -> CoreResult<Registration> {
        match write {
            RegistrationWrite::Insert => {
                if self.registration(request.user_id, request.event_id).is_some() {
                    return Err(CoreError::conflict("already registered for this event"));
                }
                let id = self.next_id();
                let at = now();
                let row = Registration {
                    id,
                    user_id: request.user_id,
                    event_id: request.event_id,
                    status: write.status(),
                    created_at: at,
                    updated_at: at,
                };
                self.registrations.insert(id, row.clone());
                self.registration_keys
                    .insert((request.user_id, request.event_id), id);
                self.by_event.entry(request.event_id).or_default().push(id);
                Ok(row)
            }
            RegistrationWrite::Update { id, status } => {
                let row = self
                    .registrations
                    .get_mut(&id)
                    .ok_or_else(|| CoreError::not_found("registration not found"))?;
                row.status = status;
                row.updated_at = now();
                Ok(row.clone())
            }
        }
    }

    fn check_guard(&self, guard: &CascadeGuard) -> CoreResult<()> {
        match *guard {
            CascadeGuard::AccountDeletable { user_id } => {
                let led = cascade::led_live_clubs(
                    self.memberships.values().filter(|m| m.user_id == user_id),
                    |club_id| self.club_is_live(club_id),
                );
                cascade::check_account_deletable(self.users.get(&user_id), led)
            }
            CascadeGuard::LeaderOf { club_id, user_id } => cascade::check_club_deletable(
                self.clubs.get(&club_id),
                self.membership(user_id, club_id),
            ),
            CascadeGuard::HostOf { event_id, user_id } => {
                cascade::check_event_deletable(self.events.get(&event_id), user_id)
            }
        }
    }

    fn set_registrations(
        &mut self,
        status: RegistrationStatus,
        at: NaiveDateTime,
        matches: impl Fn(&Registration) -> bool,
    ) -> usize {
        let mut rows = 0;
        for r in self.registrations.values_mut() {
            if matches(r) && r.status != status {
                r.status = status;
                r.updated_at = at;
                rows += 1;
            }
        }
        rows
    }

    fn set_memberships(
        &mut self,
        status: MembershipStatus,
        at: NaiveDateTime,
        matches: impl Fn(&Membership) -> bool,
    ) -> usize {
        let mut rows = 0;
        for m in self.memberships.values_mut() {
            if matches(m) && m.status != status {
                m.status = status;
                m.updated_at = at;
                rows += 1;
            }
        }
        rows
    }

    fn delete_events(&mut self, matches: impl Fn(&Event) -> bool) -> usize {
        let mut rows = 0;
        for e in self.events.values_mut() {
            if matches(e) && !e.is_deleted {
                e.is_deleted = true;
                rows += 1;
            }
        }
        rows
    }

    fn apply_step(&mut self, step: &CascadeStep, at: NaiveDateTime) -> usize {
        match *step {
            CascadeStep::MembershipsOfUser { user_id, status } => {
                self.set_memberships(status, at, |m| m.user_id == user_id)
            }
            CascadeStep::RegistrationsOfUser { user_id, status } => {
                self.set_registrations(status, at, |r| r.user_id == user_id)
            }
            CascadeStep::RegistrationsOfHostedEvents { user_id, status } => {
                let hosted: Vec<EventId> = self
                    .events
                    .values()
                    .filter(|e| e.host_id == user_id)
                    .map(|e| e.id)
                    .collect();
                self.set_registrations(status, at, |r| hosted.contains(&r.event_id))
            }
            CascadeStep::HostedEvents { user_id } => self.delete_events(|e| e.host_id == user_id),
            CascadeStep::MembershipsOfClub { club_id, status } => {
                self.set_memberships(status, at, |m| m.club_id == club_id)
            }
            CascadeStep::RegistrationsOfClubEvents { club_id, status } => {
                let under_club: Vec<EventId> = self
                    .events
                    .values()
                    .filter(|e| e.club_id == Some(club_id))
                    .map(|e| e.id)
                    .collect();
                self.set_registrations(status, at, |r| under_club.contains(&r.event_id))
            }
            CascadeStep::ClubEvents { club_id } => {
                self.delete_events(|e| e.club_id == Some(club_id))
            }
            CascadeStep::RegistrationsOfEvent { event_id, status } => {
                self.set_registrations(status, at, |r| r.event_id == event_id)
            }
            CascadeStep::Event { event_id } => self.delete_events(|e| e.id == event_id),
            CascadeStep::Club { club_id } => match self.clubs.get_mut(&club_id) {
                Some(c) if !c.is_deleted => {
                    c.is_deleted = true;
                    1
                }
                _ => 0,
            },
            CascadeStep::User { user_id } => match self.users.get_mut(&user_id) {
                Some(u) if !u.is_deleted => {
                    u.is_deleted = true;
                    1
                }
                _ => 0,
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    event_locks: Mutex<HashMap<EventId, Arc<AsyncMutex<()>>>>,
    cascades: RwLock<()>,
    fail_at: Mutex<Option<CascadeStep>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> CoreResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(poisoned)
    }

    /// Takes the exclusive lock of one event, as a registration unit does.
    /// Holding the guard stalls every registration unit for that event.
    pub async fn lock_event(&self, event_id: EventId) -> CoreResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.event_locks.lock().map_err(poisoned)?;
            Arc::clone(locks.entry(event_id).or_default())
        };
        Ok(lock.lock_owned().await)
    }

    /// Makes the next cascade that reaches `step` fail there.
    pub fn fail_cascade_at(&self, step: CascadeStep) -> CoreResult<()> {
        *self.fail_at.lock().map_err(poisoned)? = Some(step);
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, new: NewUser) -> CoreResult<User> {
        let mut tables = self.tables()?;
        if tables.users.values().any(|u| u.email == new.email) {
            return Err(CoreError::conflict("email is already in use"));
        }
        if tables.users.values().any(|u| u.nickname == new.nickname) {
            return Err(CoreError::conflict("nickname is already in use"));
        }
        let id = tables.next_id();
        let user = User {
            id,
            email: new.email,
            nickname: new.nickname,
            password_hash: new.password_hash,
            is_deleted: false,
            created_at: now(),
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: UserId) -> CoreResult<Option<User>> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        Ok(self
            .tables()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn set_password_hash(&self, id: UserId, password_hash: String) -> CoreResult<()> {
        let mut tables = self.tables()?;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("user not found"))?;
        user.password_hash = password_hash;
        Ok(())
    }

    async fn set_nickname(&self, id: UserId, nickname: String) -> CoreResult<User> {
        let mut tables = self.tables()?;
        if tables.users.values().any(|u| u.nickname == nickname && u.id != id) {
            return Err(CoreError::conflict("nickname is already in use"));
        }
        match tables.users.get_mut(&id) {
            Some(user) if !user.is_deleted => {
                user.nickname = nickname;
                Ok(user.clone())
            }
            _ => Err(CoreError::not_found("user not found")),
        }
    }

    async fn insert_club(&self, new: NewClub, leader_id: UserId) -> CoreResult<(Club, Membership)> {
        let mut tables = self.tables()?;
        if tables.clubs.values().any(|c| c.club_name == new.club_name) {
            return Err(CoreError::conflict("club name is already in use"));
        }
        let id = tables.next_id();
        let club = Club {
            id,
            club_name: new.club_name,
            club_type: new.club_type,
            intro: new.intro,
            description: new.description,
            location_name: new.location_name,
            is_deleted: false,
            created_at: now(),
        };
        tables.clubs.insert(id, club.clone());
        let leader = tables.write_membership(
            leader_id,
            id,
            MembershipWrite::Insert {
                role: ClubRole::Leader,
                status: MembershipStatus::Active,
            },
        )?;
        Ok((club, leader))
    }

    async fn find_club(&self, id: ClubId) -> CoreResult<Option<Club>> {
        Ok(self.tables()?.clubs.get(&id).cloned())
    }

    async fn update_club(&self, id: ClubId, edit: ClubEdit) -> CoreResult<Club> {
        let mut tables = self.tables()?;
        let club = match tables.clubs.get_mut(&id) {
            Some(club) if !club.is_deleted => club,
            _ => return Err(CoreError::not_found("club not found")),
        };
        if let Some(intro) = edit.intro {
            club.intro = intro;
        }
        if let Some(description) = edit.description {
            club.description = description;
        }
        if let Some(location_name) = edit.location_name {
            club.location_name = location_name;
        }
        Ok(club.clone())
    }

    async fn insert_event(&self, new: NewEvent) -> CoreResult<Event> {
        let mut tables = self.tables()?;
        if new.club_id.map_or(false, |club_id| !tables.club_is_live(club_id)) {
            return Err(CoreError::not_found("club not found"));
        }
        let id = tables.next_id();
        let event = Event {
            id,
            host_id: new.host_id,
            scope: new.scope,
            club_id: new.club_id,
            kind: new.kind,
            title: new.title,
            content: new.content,
            location_name: new.location_name,
            capacity: new.capacity,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            is_deleted: false,
            created_at: now(),
        };
        tables.events.insert(id, event.clone());
        Ok(event)
    }

    async fn find_event(&self, id: EventId) -> CoreResult<Option<Event>> {
        Ok(self.tables()?.events.get(&id).cloned())
    }

    async fn update_event(&self, id: EventId, edit: EventEdit) -> CoreResult<Event> {
        let mut tables = self.tables()?;
        let event = match tables.events.get_mut(&id) {
            Some(event) if !event.is_deleted => event,
            _ => return Err(CoreError::not_found("event not found")),
        };
        if let Some(title) = edit.title {
            event.title = title;
        }
        if let Some(content) = edit.content {
            event.content = content;
        }
        if edit.location_name.is_some() {
            event.location_name = edit.location_name;
        }
        if let Some(starts_at) = edit.starts_at {
            event.starts_at = starts_at;
        }
        if let Some(ends_at) = edit.ends_at {
            event.ends_at = ends_at;
        }
        Ok(event.clone())
    }

    async fn find_membership(&self, user_id: UserId, club_id: ClubId) -> CoreResult<Option<Membership>> {
        Ok(self.tables()?.membership(user_id, club_id).cloned())
    }

    async fn memberships_of_club(
        &self,
        club_id: ClubId,
        status: MembershipStatus,
    ) -> CoreResult<Vec<Membership>> {
        Ok(self
            .tables()?
            .memberships
            .values()
            .filter(|m| m.club_id == club_id && m.status == status)
            .cloned()
            .collect())
    }

    async fn memberships_of_user(
        &self,
        user_id: UserId,
        statuses: &[MembershipStatus],
    ) -> CoreResult<Vec<Membership>> {
        Ok(self
            .tables()?
            .memberships
            .values()
            .filter(|m| m.user_id == user_id && statuses.contains(&m.status))
            .cloned()
            .collect())
    }

    async fn run_membership(&self, request: MembershipRequest) -> CoreResult<Membership> {
        let mut tables = self.tables()?;
        membership::check_parents(
            &request,
            tables.club_is_live(request.club_id),
            tables.user_is_live(request.user_id),
        )?;
        let target = tables.membership(request.user_id, request.club_id).cloned();
        let actor_id = request.command.actor();
        let actor = actor_id.and_then(|id| tables.membership(id, request.club_id).cloned());

        let decision = membership::decide(&request, target.as_ref(), actor.as_ref())?;
        if let (Some(write), Some(actor_id)) = (decision.actor, actor_id) {
            tables.write_membership(actor_id, request.club_id, write)?;
        }
        tables.write_membership(request.user_id, request.club_id, decision.target)
    }

    async fn find_registration(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> CoreResult<Option<Registration>> {
        Ok(self.tables()?.registration(user_id, event_id).cloned())
    }

    async fn registrations_of_user(&self, user_id: UserId) -> CoreResult<Vec<Registration>> {
        Ok(self
            .tables()?
            .registrations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn registrations_of_event(&self, event_id: EventId) -> CoreResult<Vec<Registration>> {
        Ok(self
            .tables()?
            .registrations_of_event(event_id)
            .cloned()
            .collect())
    }

    async fn count_confirmed(&self, event_id: EventId) -> CoreResult<i64> {
        Ok(self.tables()?.confirmed(event_id))
    }

    async fn run_registration(&self, request: RegistrationRequest) -> CoreResult<Registration> {
        let _gate = self.cascades.read().await;
        let _event = self.lock_event(request.event_id).await?;
        tracing::debug!(event_id = request.event_id, "event lock acquired");

        let write = {
            let tables = self.tables()?;
            let snapshot = RegistrationSnapshot {
                event: tables
                    .events
                    .get(&request.event_id)
                    .map_or_else(|| EventRef::missing(request.event_id), EventRef::from),
                confirmed: tables.confirmed(request.event_id),
                existing: tables.registration(request.user_id, request.event_id),
                user_live: tables.user_is_live(request.user_id),
            };
            registration::decide(&request, &snapshot)?
        };

        tokio::task::yield_now().await;

        self.tables()?.write_registration(&request, write)
    }

    async fn run_cascade(&self, plan: CascadePlan) -> CoreResult<CascadeReport> {
        let _gate = self.cascades.write().await;
        let fail_at = self.fail_at.lock().map_err(poisoned)?.take();
        let mut tables = self.tables()?;
        tables.check_guard(&plan.guard)?;

        let mut staged = tables.clone();
        let mut report = CascadeReport::default();
        let at = now();
        for step in &plan.steps {
            if fail_at.as_ref() == Some(step) {
                return Err(CoreError::Fatal(format!("{step:?} failed").into()));
            }
            let rows = staged.apply_step(step, at);
            report.record(step, rows);
        }
        *tables = staged;
        Ok(report)
    }
}
