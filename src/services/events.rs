use crate::{
    error::{CoreError, CoreResult},
    models::{Event, EventEdit, EventId, EventRef, NewEvent, Scope, UserId},
    services::AccountDirectory,
    store::Store,
};
use std::sync::Arc;

const MAX_TITLE_LEN: usize = 200;
const MAX_CONTENT_LEN: usize = 5000;

#[derive(Clone)]
pub struct EventCatalog {
    store: Arc<dyn Store>,
    accounts: AccountDirectory,
}

fn validate_text(title: &str, content: &str) -> CoreResult<()> {
    if title.trim().is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(CoreError::invalid_input(format!(
            "title must be 1 to {MAX_TITLE_LEN} characters"
        )));
    }
    if content.trim().is_empty() || content.chars().count() > MAX_CONTENT_LEN {
        return Err(CoreError::invalid_input(format!(
            "content must be 1 to {MAX_CONTENT_LEN} characters"
        )));
    }
    Ok(())
}

fn validate(new: &NewEvent) -> CoreResult<()> {
    validate_text(&new.title, &new.content)?;
    if new.capacity <= 0 {
        return Err(CoreError::invalid_input("capacity must be positive"));
    }
    if new.starts_at >= new.ends_at {
        return Err(CoreError::invalid_input("an event must end after it starts"));
    }
    match (new.scope, new.club_id) {
        (Scope::Club, None) => Err(CoreError::invalid_input("a club event needs a club id")),
        (Scope::Global, Some(_)) => Err(CoreError::invalid_input(
            "a global event cannot belong to a club",
        )),
        _ => Ok(()),
    }
}

impl EventCatalog {
    pub fn new(store: Arc<dyn Store>, accounts: AccountDirectory) -> Self {
        Self { store, accounts }
    }

    #[tracing::instrument(skip(self, new), fields(scope = %new.scope, capacity = new.capacity))]
    pub async fn create(&self, host: UserId, mut new: NewEvent) -> CoreResult<Event> {
        validate(&new)?;
        self.accounts.require(host).await?;

        new.host_id = host;
        let event = self.store.insert_event(new).await?;
        tracing::info!(event_id = event.id, "event created");
        Ok(event)
    }

    /// Host-only edit. The merged event must still validate.
    #[tracing::instrument(skip(self, edit))]
    pub async fn update(&self, host: UserId, event_id: EventId, edit: EventEdit) -> CoreResult<Event> {
        if edit.is_empty() {
            return Err(CoreError::invalid_input("nothing to update"));
        }
        let current = self.find(event_id).await?;
        if current.host_id != host {
            return Err(CoreError::invalid("only the event host can edit the event"));
        }
        validate_text(
            edit.title.as_deref().unwrap_or(&current.title),
            edit.content.as_deref().unwrap_or(&current.content),
        )?;
        if edit.starts_at.unwrap_or(current.starts_at) >= edit.ends_at.unwrap_or(current.ends_at) {
            return Err(CoreError::invalid_input("an event must end after it starts"));
        }

        let event = self.store.update_event(event_id, edit).await?;
        tracing::info!(event_id, "event updated");
        Ok(event)
    }

    pub async fn get(&self, event_id: EventId) -> CoreResult<EventRef> {
        Ok(self
            .store
            .find_event(event_id)
            .await?
            .as_ref()
            .map_or_else(|| EventRef::missing(event_id), EventRef::from))
    }

    /// The live event, or `NotFound` when it is missing or deleted.
    pub async fn find(&self, event_id: EventId) -> CoreResult<Event> {
        match self.store.find_event(event_id).await? {
            Some(event) if !event.is_deleted => Ok(event),
            _ => Err(CoreError::not_found("event not found")),
        }
    }
}
