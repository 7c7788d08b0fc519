use crate::{
    error::{CoreError, CoreResult},
    models::{ClubRole, Membership},
};

pub const fn has_management_permission(role: ClubRole) -> bool {
    matches!(role, ClubRole::Leader | ClubRole::Manager)
}

/// The caller must be an active leader or manager of the club.
pub fn require_management(actor: Option<&Membership>) -> CoreResult<&Membership> {
    match actor {
        Some(m) if m.is_active() && has_management_permission(m.role) => Ok(m),
        Some(_) => Err(CoreError::forbidden("club management permission required")),
        None => Err(CoreError::forbidden("not a member of this club")),
    }
}

/// The caller must be the active leader of the club.
pub fn require_leader(actor: Option<&Membership>) -> CoreResult<&Membership> {
    match actor {
        Some(m) if m.is_active() && m.role == ClubRole::Leader => Ok(m),
        Some(_) => Err(CoreError::forbidden("only the club leader can do this")),
        None => Err(CoreError::forbidden("not a member of this club")),
    }
}
