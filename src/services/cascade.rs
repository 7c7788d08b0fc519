use crate::{
    error::{CoreError, CoreResult},
    models::{ClubId, EventId, UserId},
    rules::cascade::{CascadePlan, CascadeReport},
    store::Store,
};
use std::sync::Arc;

/// Soft-deletes a user, club or event together with everything that hangs
/// off it, in one atomic unit of work.
#[derive(Clone)]
pub struct CascadeCoordinator {
    store: Arc<dyn Store>,
}

impl CascadeCoordinator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn run(&self, plan: CascadePlan) -> CoreResult<CascadeReport> {
        let guard = plan.guard;
        match self.store.run_cascade(plan).await {
            Ok(report) => {
                tracing::info!(?guard, ?report, "cascade committed");
                Ok(report)
            }
            Err(CoreError::Fatal(reason)) => {
                tracing::warn!(?guard, %reason, "cascade rolled back");
                Err(CoreError::Fatal(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Memberships become LEFT, registrations and hosted events are closed,
    /// then the account is soft-deleted. Leaders of live clubs are refused.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, user_id: UserId) -> CoreResult<CascadeReport> {
        self.run(CascadePlan::delete_user(user_id)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_club(&self, caller: UserId, club_id: ClubId) -> CoreResult<CascadeReport> {
        self.run(CascadePlan::delete_club(caller, club_id)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_event(&self, host: UserId, event_id: EventId) -> CoreResult<CascadeReport> {
        self.run(CascadePlan::delete_event(host, event_id)).await
    }
}
