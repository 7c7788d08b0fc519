use crate::{
    error::{CoreError, CoreResult},
    models::{EventId, Registration, RegistrationStatus, UserId},
    rules::registration::{RegistrationCommand, RegistrationRequest},
    services::EventCatalog,
    store::Store,
};
use std::sync::Arc;

/// One registration per (user, event). Register, cancel and host rejection
/// for the same event are serialized by the store's per-event lock.
#[derive(Clone)]
pub struct EventRegistration {
    store: Arc<dyn Store>,
    events: EventCatalog,
}

impl EventRegistration {
    pub fn new(store: Arc<dyn Store>, events: EventCatalog) -> Self {
        Self { store, events }
    }

    async fn run(&self, request: RegistrationRequest) -> CoreResult<Registration> {
        match self.store.run_registration(request).await {
            Ok(registration) => {
                tracing::info!(
                    event_id = request.event_id,
                    user_id = request.user_id,
                    command = request.command.name(),
                    status = %registration.status,
                    "registration transition"
                );
                Ok(registration)
            }
            Err(CoreError::Conflict(reason)) => {
                tracing::warn!(
                    event_id = request.event_id,
                    user_id = request.user_id,
                    %reason,
                    "registration refused"
                );
                Err(CoreError::Conflict(reason))
            }
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn register(&self, user_id: UserId, event_id: EventId) -> CoreResult<Registration> {
        self.run(RegistrationRequest::new(
            event_id,
            user_id,
            RegistrationCommand::Register,
        ))
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, user_id: UserId, event_id: EventId) -> CoreResult<Registration> {
        self.run(RegistrationRequest::new(
            event_id,
            user_id,
            RegistrationCommand::Cancel,
        ))
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn reject_by_host(
        &self,
        host_id: UserId,
        event_id: EventId,
        participant_id: UserId,
    ) -> CoreResult<Registration> {
        self.run(RegistrationRequest::new(
            event_id,
            participant_id,
            RegistrationCommand::RejectByHost { host_id },
        ))
        .await
    }

    pub async fn status(&self, user_id: UserId, event_id: EventId) -> CoreResult<RegistrationStatus> {
        self.store
            .find_registration(user_id, event_id)
            .await?
            .map(|r| r.status)
            .ok_or_else(|| CoreError::not_found("registration not found"))
    }

    pub async fn registrations_of(&self, user_id: UserId) -> CoreResult<Vec<Registration>> {
        self.store.registrations_of_user(user_id).await
    }

    /// Confirmed registrations of a live event.
    pub async fn participants(&self, event_id: EventId) -> CoreResult<Vec<Registration>> {
        self.events.find(event_id).await?;
        let mut rows = self.store.registrations_of_event(event_id).await?;
        rows.retain(|r| r.status == RegistrationStatus::Confirmed);
        Ok(rows)
    }

    /// Confirmed registrations of a live event, counted.
    pub async fn confirmed_count(&self, event_id: EventId) -> CoreResult<i64> {
        self.events.find(event_id).await?;
        self.store.count_confirmed(event_id).await
    }
}
