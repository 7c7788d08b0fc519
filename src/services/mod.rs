//! The components of the core. Each one validates its input, consults its
//! neighbours through their public lookups and hands state changes to a
//! store unit of work.

use crate::store::Store;
use std::sync::Arc;

mod accounts;
mod cascade;
mod clubs;
mod events;
mod membership;
mod registration;

pub use accounts::AccountDirectory;
pub use cascade::CascadeCoordinator;
pub use clubs::ClubRegistry;
pub use events::EventCatalog;
pub use membership::ClubMembership;
pub use registration::EventRegistration;

/// Every component wired to one store. Cheap to clone.
#[derive(Clone)]
pub struct Services {
    pub accounts: AccountDirectory,
    pub clubs: ClubRegistry,
    pub events: EventCatalog,
    pub memberships: ClubMembership,
    pub registrations: EventRegistration,
    pub cascades: CascadeCoordinator,
}

impl Services {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let accounts = AccountDirectory::new(store.clone());
        let clubs = ClubRegistry::new(store.clone(), accounts.clone());
        let events = EventCatalog::new(store.clone(), accounts.clone());
        let memberships = ClubMembership::new(store.clone(), clubs.clone());
        let registrations = EventRegistration::new(store.clone(), events.clone());
        let cascades = CascadeCoordinator::new(store);

        Self {
            accounts,
            clubs,
            events,
            memberships,
            registrations,
            cascades,
        }
    }
}
