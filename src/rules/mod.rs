//! Transition rules for memberships, registrations and cascades.
//!
//! Everything here is pure: the stores load the rows involved under the
//! appropriate lock, hand them to these functions, and persist whatever
//! write comes back. Both store implementations therefore share one set of
//! rules.

pub mod cascade;
pub mod membership;
pub mod registration;
pub mod roles;
