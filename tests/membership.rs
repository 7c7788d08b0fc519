#![allow(clippy::unwrap_used)]

mod common;

use async_trait::async_trait;
use groove_hub::{
    error::{CoreError, CoreResult},
    models::{
        Club, ClubEdit, ClubId, ClubRole, Event, EventEdit, EventId, Membership, MembershipStatus,
        NewClub, NewEvent, NewUser, Registration, User, UserId,
    },
    rules::{
        cascade::{CascadePlan, CascadeReport},
        membership::MembershipRequest,
        registration::RegistrationRequest,
    },
    services::Services,
    store::{MemoryStore, Store},
};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn apply_approve_leave_reapply_reuses_one_row() {
    let world = common::world();
    let leader = world.user("leader").await;
    let club = world.club(leader, "Boogie Nights").await;
    let user = world.user("popper").await;
    let memberships = &world.services.memberships;

    let applied = memberships.apply(user, club).await.unwrap();
    assert_eq!(applied.status, MembershipStatus::Pending);
    let approved = memberships.approve(leader, club, user).await.unwrap();
    assert_eq!(approved.status, MembershipStatus::Active);
    let left = memberships.leave(user, club).await.unwrap();
    assert_eq!(left.status, MembershipStatus::Left);
    let reapplied = memberships.apply(user, club).await.unwrap();

    assert_eq!(reapplied.status, MembershipStatus::Pending);
    assert_eq!(reapplied.role, ClubRole::Member);
    assert_eq!(applied.id, reapplied.id);
    assert_eq!(approved.id, left.id);
    assert_eq!(
        memberships.status(user, club).await.unwrap(),
        MembershipStatus::Pending
    );
}

#[tokio::test]
async fn second_application_while_pending_conflicts() {
    let world = common::world();
    let leader = world.user("leader").await;
    let club = world.club(leader, "Lockers").await;
    let user = world.user("locker").await;

    world.services.memberships.apply(user, club).await.unwrap();
    let again = world.services.memberships.apply(user, club).await;

    assert!(matches!(again, Err(CoreError::Conflict(_))));
}

#[tokio::test]
async fn applying_to_a_missing_club_is_not_found() {
    let world = common::world();
    let user = world.user("waacker").await;

    let result = world.services.memberships.apply(user, 404).await;

    assert!(matches!(result, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn plain_members_cannot_review_applications() {
    let world = common::world();
    let leader = world.user("leader").await;
    let club = world.club(leader, "House Heads").await;
    let member = world.member(club, leader, "member").await;
    let outsider = world.user("outsider").await;
    let applicant = world.user("applicant").await;
    let memberships = &world.services.memberships;
    memberships.apply(applicant, club).await.unwrap();

    for caller in [member, outsider] {
        assert!(matches!(
            memberships.approve(caller, club, applicant).await,
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            memberships.reject(caller, club, applicant).await,
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            memberships.pending_applications(caller, club).await,
            Err(CoreError::Forbidden(_))
        ));
    }
    assert_eq!(
        memberships.status(applicant, club).await.unwrap(),
        MembershipStatus::Pending
    );
}

#[tokio::test]
async fn managers_review_and_kick_but_never_touch_the_leader() {
    let world = common::world();
    let leader = world.user("leader").await;
    let club = world.club(leader, "Krumpers").await;
    let manager = world.member(club, leader, "manager").await;
    let memberships = &world.services.memberships;
    memberships
        .change_role(leader, club, manager, ClubRole::Manager)
        .await
        .unwrap();

    let applicant = world.user("applicant").await;
    memberships.apply(applicant, club).await.unwrap();
    let pending = memberships.pending_applications(manager, club).await.unwrap();
    assert_eq!(pending.len(), 1);
    memberships.approve(manager, club, applicant).await.unwrap();

    let kicked = memberships.kick(manager, club, applicant).await.unwrap();
    assert_eq!(kicked.status, MembershipStatus::Left);

    assert!(matches!(
        memberships.kick(manager, club, leader).await,
        Err(CoreError::InvalidOperation(_))
    ));
    assert!(matches!(
        memberships.kick(manager, club, manager).await,
        Err(CoreError::InvalidOperation(_))
    ));
    assert!(matches!(
        memberships
            .change_role(manager, club, leader, ClubRole::Member)
            .await,
        Err(CoreError::Forbidden(_))
    ));
    assert!(matches!(
        memberships.leave(leader, club).await,
        Err(CoreError::InvalidOperation(_))
    ));
    assert_eq!(
        memberships.status(leader, club).await.unwrap(),
        MembershipStatus::Active
    );
}

#[tokio::test]
async fn leadership_transfer_swaps_roles() {
    let world = common::world();
    let leader = world.user("leader").await;
    let club = world.club(leader, "Breakers").await;
    let heir = world.member(club, leader, "heir").await;
    let memberships = &world.services.memberships;

    assert!(matches!(
        memberships
            .change_role(leader, club, heir, ClubRole::Leader)
            .await,
        Err(CoreError::InvalidOperation(_))
    ));

    let promoted = memberships
        .transfer_leadership(leader, club, heir)
        .await
        .unwrap();
    assert_eq!(promoted.role, ClubRole::Leader);

    let members = memberships.active_members(club).await.unwrap();
    let roles: Vec<_> = members.iter().map(|m| (m.user_id, m.role)).collect();
    assert!(roles.contains(&(leader, ClubRole::Manager)));
    assert!(roles.contains(&(heir, ClubRole::Leader)));

    // the former leader may now leave
    memberships.leave(leader, club).await.unwrap();
}

#[tokio::test]
async fn clubs_of_lists_active_and_optionally_pending() {
    let world = common::world();
    let leader = world.user("leader").await;
    let joined = world.club(leader, "Joined").await;
    let applied = world.club(leader, "Applied").await;
    let user = world.member(joined, leader, "dancer").await;
    world.services.memberships.apply(user, applied).await.unwrap();

    let active = world.services.memberships.clubs_of(user, false).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].club_id, joined);

    let all = world.services.memberships.clubs_of(user, true).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn reactivation_cycles_through_one_row() {
    let world = common::world();
    let leader = world.user("leader").await;
    let club = world.club(leader, "Cyclers").await;
    let user = world.member(club, leader, "dancer").await;
    let memberships = &world.services.memberships;

    let left = memberships.leave(user, club).await.unwrap();
    assert_eq!(left.status, MembershipStatus::Left);

    let mut seen = vec![left.id];
    for expected in [
        MembershipStatus::Pending,
        MembershipStatus::Canceled,
        MembershipStatus::Pending,
        MembershipStatus::Canceled,
        MembershipStatus::Pending,
    ] {
        let row = if expected == MembershipStatus::Pending {
            memberships.apply(user, club).await.unwrap()
        } else {
            memberships.cancel(user, club).await.unwrap()
        };
        assert_eq!(row.status, expected);
        seen.push(row.id);
    }

    assert!(seen.iter().all(|id| *id == left.id));
    assert_eq!(
        world.store.find_membership(user, club).await.unwrap().unwrap().id,
        left.id
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_applications_by_one_user_leave_one_row() {
    let world = Arc::new(common::world());
    let leader = world.user("leader").await;
    let club = world.club(leader, "Doubles").await;
    let user = world.user("eager").await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let world = world.clone();
            tokio::spawn(async move { world.services.memberships.apply(user, club).await })
        })
        .collect();
    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(m) => {
                assert_eq!(m.status, MembershipStatus::Pending);
                accepted += 1;
            }
            Err(CoreError::Conflict(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(accepted, 1);
    let pending = world
        .services
        .memberships
        .pending_applications(leader, club)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
}

/// Runs a club deletion right before handing each membership unit of work
/// to the wrapped store.
struct DeletesClubFirst {
    inner: Arc<MemoryStore>,
    deletion: Mutex<Option<CascadePlan>>,
}

#[async_trait]
impl Store for DeletesClubFirst {
    async fn insert_user(&self, new: NewUser) -> CoreResult<User> {
        self.inner.insert_user(new).await
    }
    async fn find_user(&self, id: UserId) -> CoreResult<Option<User>> {
        self.inner.find_user(id).await
    }
    async fn find_user_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        self.inner.find_user_by_email(email).await
    }
    async fn set_password_hash(&self, id: UserId, password_hash: String) -> CoreResult<()> {
        self.inner.set_password_hash(id, password_hash).await
    }
    async fn set_nickname(&self, id: UserId, nickname: String) -> CoreResult<User> {
        self.inner.set_nickname(id, nickname).await
    }
    async fn insert_club(&self, new: NewClub, leader_id: UserId) -> CoreResult<(Club, Membership)> {
        self.inner.insert_club(new, leader_id).await
    }
    async fn find_club(&self, id: ClubId) -> CoreResult<Option<Club>> {
        self.inner.find_club(id).await
    }
    async fn update_club(&self, id: ClubId, edit: ClubEdit) -> CoreResult<Club> {
        self.inner.update_club(id, edit).await
    }
    async fn insert_event(&self, new: NewEvent) -> CoreResult<Event> {
        self.inner.insert_event(new).await
    }
    async fn find_event(&self, id: EventId) -> CoreResult<Option<Event>> {
        self.inner.find_event(id).await
    }
    async fn update_event(&self, id: EventId, edit: EventEdit) -> CoreResult<Event> {
        self.inner.update_event(id, edit).await
    }
    async fn find_membership(&self, user_id: UserId, club_id: ClubId) -> CoreResult<Option<Membership>> {
        self.inner.find_membership(user_id, club_id).await
    }
    async fn memberships_of_club(
        &self,
        club_id: ClubId,
        status: MembershipStatus,
    ) -> CoreResult<Vec<Membership>> {
        self.inner.memberships_of_club(club_id, status).await
    }
    async fn memberships_of_user(
        &self,
        user_id: UserId,
        statuses: &[MembershipStatus],
    ) -> CoreResult<Vec<Membership>> {
        self.inner.memberships_of_user(user_id, statuses).await
    }
    async fn run_membership(&self, request: MembershipRequest) -> CoreResult<Membership> {
        let deletion = self.deletion.lock().unwrap().take();
        if let Some(plan) = deletion {
            self.inner.run_cascade(plan).await?;
        }
        self.inner.run_membership(request).await
    }
    async fn find_registration(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> CoreResult<Option<Registration>> {
        self.inner.find_registration(user_id, event_id).await
    }
    async fn registrations_of_user(&self, user_id: UserId) -> CoreResult<Vec<Registration>> {
        self.inner.registrations_of_user(user_id).await
    }
    async fn registrations_of_event(&self, event_id: EventId) -> CoreResult<Vec<Registration>> {
        self.inner.registrations_of_event(event_id).await
    }
    async fn count_confirmed(&self, event_id: EventId) -> CoreResult<i64> {
        self.inner.count_confirmed(event_id).await
    }
    async fn run_registration(&self, request: RegistrationRequest) -> CoreResult<Registration> {
        self.inner.run_registration(request).await
    }
    async fn run_cascade(&self, plan: CascadePlan) -> CoreResult<CascadeReport> {
        self.inner.run_cascade(plan).await
    }
}

#[tokio::test]
async fn an_application_racing_a_club_deletion_is_refused() {
    let world = common::world();
    let leader = world.user("leader").await;
    let club = world.club(leader, "Vanishing").await;
    let applicant = world.user("applicant").await;

    let racing = Arc::new(DeletesClubFirst {
        inner: world.store.clone(),
        deletion: Mutex::new(Some(CascadePlan::delete_club(leader, club))),
    });
    let services = Services::new(racing as Arc<dyn Store>);

    let result = services.memberships.apply(applicant, club).await;

    assert!(matches!(result, Err(CoreError::NotFound(_))));
    assert!(!world.services.clubs.get(club).await.unwrap().is_live());
    assert!(world
        .store
        .find_membership(applicant, club)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn deleted_accounts_cannot_apply() {
    let world = common::world();
    let leader = world.user("leader").await;
    let club = world.club(leader, "Ghosts").await;
    let user = world.user("ghost").await;
    world.services.cascades.delete_user(user).await.unwrap();

    assert!(matches!(
        world.services.memberships.apply(user, club).await,
        Err(CoreError::NotFound(_))
    ));
}
