use crate::{
    error::{CoreError, CoreResult},
    models::{ClubId, ClubRole, Membership, MembershipStatus, UserId},
    rules::{
        membership::{MembershipCommand, MembershipRequest},
        roles,
    },
    services::ClubRegistry,
    store::Store,
};
use std::sync::Arc;

/// One membership per (user, club). Every transition goes through
/// `rules::membership::decide` inside a store unit of work that checks the
/// club is live and holds the actor's and target's rows locked.
#[derive(Clone)]
pub struct ClubMembership {
    store: Arc<dyn Store>,
    clubs: ClubRegistry,
}

impl ClubMembership {
    pub fn new(store: Arc<dyn Store>, clubs: ClubRegistry) -> Self {
        Self { store, clubs }
    }

    async fn run(&self, request: MembershipRequest) -> CoreResult<Membership> {
        let membership = self.store.run_membership(request).await?;
        tracing::info!(
            club_id = request.club_id,
            user_id = request.user_id,
            command = request.command.name(),
            role = %membership.role,
            status = %membership.status,
            "membership transition"
        );
        Ok(membership)
    }

    #[tracing::instrument(skip(self))]
    pub async fn apply(&self, user_id: UserId, club_id: ClubId) -> CoreResult<Membership> {
        self.run(MembershipRequest::new(club_id, user_id, MembershipCommand::Apply))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, user_id: UserId, club_id: ClubId) -> CoreResult<Membership> {
        self.run(MembershipRequest::new(club_id, user_id, MembershipCommand::Cancel))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn leave(&self, user_id: UserId, club_id: ClubId) -> CoreResult<Membership> {
        self.run(MembershipRequest::new(club_id, user_id, MembershipCommand::Leave))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn approve(
        &self,
        manager_id: UserId,
        club_id: ClubId,
        applicant_id: UserId,
    ) -> CoreResult<Membership> {
        self.run(MembershipRequest::new(
            club_id,
            applicant_id,
            MembershipCommand::Approve { manager_id },
        ))
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn reject(
        &self,
        manager_id: UserId,
        club_id: ClubId,
        applicant_id: UserId,
    ) -> CoreResult<Membership> {
        self.run(MembershipRequest::new(
            club_id,
            applicant_id,
            MembershipCommand::Reject { manager_id },
        ))
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn kick(
        &self,
        manager_id: UserId,
        club_id: ClubId,
        target_id: UserId,
    ) -> CoreResult<Membership> {
        self.run(MembershipRequest::new(
            club_id,
            target_id,
            MembershipCommand::Kick { manager_id },
        ))
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn change_role(
        &self,
        leader_id: UserId,
        club_id: ClubId,
        target_id: UserId,
        role: ClubRole,
    ) -> CoreResult<Membership> {
        self.run(MembershipRequest::new(
            club_id,
            target_id,
            MembershipCommand::ChangeRole { leader_id, role },
        ))
        .await
    }

    /// Makes `target_id` the leader and demotes the caller to manager, in one
    /// unit of work.
    #[tracing::instrument(skip(self))]
    pub async fn transfer_leadership(
        &self,
        leader_id: UserId,
        club_id: ClubId,
        target_id: UserId,
    ) -> CoreResult<Membership> {
        self.run(MembershipRequest::new(
            club_id,
            target_id,
            MembershipCommand::TransferLeadership { leader_id },
        ))
        .await
    }

    pub async fn status(&self, user_id: UserId, club_id: ClubId) -> CoreResult<MembershipStatus> {
        self.store
            .find_membership(user_id, club_id)
            .await?
            .map(|m| m.status)
            .ok_or_else(|| CoreError::not_found("membership not found"))
    }

    pub async fn active_members(&self, club_id: ClubId) -> CoreResult<Vec<Membership>> {
        self.clubs.require_live(club_id).await?;
        self.store
            .memberships_of_club(club_id, MembershipStatus::Active)
            .await
    }

    /// Pending applications, visible to the club's leader and managers only.
    pub async fn pending_applications(
        &self,
        manager_id: UserId,
        club_id: ClubId,
    ) -> CoreResult<Vec<Membership>> {
        self.clubs.require_live(club_id).await?;
        let caller = self.store.find_membership(manager_id, club_id).await?;
        roles::require_management(caller.as_ref())?;

        self.store
            .memberships_of_club(club_id, MembershipStatus::Pending)
            .await
    }

    /// Memberships of `user_id` in live clubs.
    pub async fn clubs_of(&self, user_id: UserId, include_pending: bool) -> CoreResult<Vec<Membership>> {
        let statuses: &[MembershipStatus] = if include_pending {
            &[MembershipStatus::Active, MembershipStatus::Pending]
        } else {
            &[MembershipStatus::Active]
        };

        let mut live = Vec::new();
        for membership in self.store.memberships_of_user(user_id, statuses).await? {
            if self.clubs.get(membership.club_id).await?.is_live() {
                live.push(membership);
            }
        }
        Ok(live)
    }
}
