//! Persistence behind the services.
//!
//! The read methods are plain lookups. The `run_*` methods are the units of
//! work: each one takes the locks its contract names, reads the rows
//! involved, asks `crate::rules` for a decision and persists it, all before
//! releasing anything.

use crate::{
    error::CoreResult,
    models::{
        Club, ClubEdit, ClubId, Event, EventEdit, EventId, Membership, MembershipStatus, NewClub,
        NewEvent, NewUser, Registration, User, UserId,
    },
    rules::{
        cascade::{CascadePlan, CascadeReport},
        membership::MembershipRequest,
        registration::RegistrationRequest,
    },
};
use async_trait::async_trait;

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with `Conflict` when the email or nickname is taken.
    async fn insert_user(&self, new: NewUser) -> CoreResult<User>;
    async fn find_user(&self, id: UserId) -> CoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> CoreResult<Option<User>>;
    async fn set_password_hash(&self, id: UserId, password_hash: String) -> CoreResult<()>;
    /// Fails with `Conflict` when another account holds the nickname.
    async fn set_nickname(&self, id: UserId, nickname: String) -> CoreResult<User>;

    /// Creates the club together with its founder's active leader membership.
    async fn insert_club(&self, new: NewClub, leader_id: UserId) -> CoreResult<(Club, Membership)>;
    async fn find_club(&self, id: ClubId) -> CoreResult<Option<Club>>;
    /// `NotFound` when the club is missing or deleted.
    async fn update_club(&self, id: ClubId, edit: ClubEdit) -> CoreResult<Club>;

    /// Fails with `NotFound` when the event's club is missing or deleted.
    async fn insert_event(&self, new: NewEvent) -> CoreResult<Event>;
    async fn find_event(&self, id: EventId) -> CoreResult<Option<Event>>;
    /// `NotFound` when the event is missing or deleted.
    async fn update_event(&self, id: EventId, edit: EventEdit) -> CoreResult<Event>;

    async fn find_membership(&self, user_id: UserId, club_id: ClubId) -> CoreResult<Option<Membership>>;
    async fn memberships_of_club(
        &self,
        club_id: ClubId,
        status: MembershipStatus,
    ) -> CoreResult<Vec<Membership>>;
    async fn memberships_of_user(
        &self,
        user_id: UserId,
        statuses: &[MembershipStatus],
    ) -> CoreResult<Vec<Membership>>;
    /// Checks the club, and the applicant of an `Apply`, are live, then locks
    /// the target's and actor's rows for the club, decides and writes.
    async fn run_membership(&self, request: MembershipRequest) -> CoreResult<Membership>;

    async fn find_registration(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> CoreResult<Option<Registration>>;
    async fn registrations_of_user(&self, user_id: UserId) -> CoreResult<Vec<Registration>>;
    async fn registrations_of_event(&self, event_id: EventId) -> CoreResult<Vec<Registration>>;
    async fn count_confirmed(&self, event_id: EventId) -> CoreResult<i64>;
    /// Holds the event's exclusive lock across the confirmed count and the
    /// write. Calls for different events never wait on each other.
    async fn run_registration(&self, request: RegistrationRequest) -> CoreResult<Registration>;

    /// Applies the whole plan or nothing. Guard failures come back as their
    /// own error kind, any failure after the first write as `Fatal`.
    async fn run_cascade(&self, plan: CascadePlan) -> CoreResult<CascadeReport>;
}
