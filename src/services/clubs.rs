use crate::{
    error::{CoreError, CoreResult},
    models::{Club, ClubEdit, ClubId, ClubRef, Membership, NewClub, UserId},
    rules::roles,
    services::AccountDirectory,
    store::Store,
};
use std::sync::Arc;

const MAX_CLUB_NAME_LEN: usize = 50;

#[derive(Clone)]
pub struct ClubRegistry {
    store: Arc<dyn Store>,
    accounts: AccountDirectory,
}

impl ClubRegistry {
    pub fn new(store: Arc<dyn Store>, accounts: AccountDirectory) -> Self {
        Self { store, accounts }
    }

    /// Creates the club with `founder` as its active leader.
    #[tracing::instrument(skip(self, new), fields(club_name = %new.club_name))]
    pub async fn create(&self, founder: UserId, mut new: NewClub) -> CoreResult<(Club, Membership)> {
        new.club_name = new.club_name.trim().to_string();
        if new.club_name.is_empty() || new.club_name.chars().count() > MAX_CLUB_NAME_LEN {
            return Err(CoreError::invalid_input(format!(
                "club name must be 1 to {MAX_CLUB_NAME_LEN} characters"
            )));
        }
        self.accounts.require(founder).await?;

        let (club, leader) = self.store.insert_club(new, founder).await?;
        tracing::info!(club_id = club.id, "club created");
        Ok((club, leader))
    }

    /// Changes the descriptive fields. Leaders and managers only.
    #[tracing::instrument(skip(self, edit))]
    pub async fn update(&self, manager_id: UserId, club_id: ClubId, edit: ClubEdit) -> CoreResult<Club> {
        if edit.is_empty() {
            return Err(CoreError::invalid_input("nothing to update"));
        }
        self.require_live(club_id).await?;
        let caller = self.store.find_membership(manager_id, club_id).await?;
        roles::require_management(caller.as_ref())?;

        let club = self.store.update_club(club_id, edit).await?;
        tracing::info!(club_id, "club updated");
        Ok(club)
    }

    pub async fn get(&self, club_id: ClubId) -> CoreResult<ClubRef> {
        let club = self.store.find_club(club_id).await?;
        Ok(ClubRef {
            id: club_id,
            exists: club.is_some(),
            is_deleted: club.map_or(false, |c| c.is_deleted),
        })
    }

    /// The live club, or `NotFound` when it is missing or deleted.
    pub async fn find(&self, club_id: ClubId) -> CoreResult<Club> {
        match self.store.find_club(club_id).await? {
            Some(club) if !club.is_deleted => Ok(club),
            _ => Err(CoreError::not_found("club not found")),
        }
    }

    pub(crate) async fn require_live(&self, club_id: ClubId) -> CoreResult<()> {
        if self.get(club_id).await?.is_live() {
            Ok(())
        } else {
            Err(CoreError::not_found("club not found"))
        }
    }
}
