use crate::{
    error::{CoreError, CoreResult},
    models::{EventId, EventRef, Registration, RegistrationId, RegistrationStatus, UserId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationCommand {
    Register,
    Cancel,
    RejectByHost { host_id: UserId },
}

impl RegistrationCommand {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Cancel => "cancel",
            Self::RejectByHost { .. } => "reject_by_host",
        }
    }
}

/// A command aimed at the registration of `user_id` for `event_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub event_id: EventId,
    pub user_id: UserId,
    pub command: RegistrationCommand,
}

impl RegistrationRequest {
    pub const fn new(event_id: EventId, user_id: UserId, command: RegistrationCommand) -> Self {
        Self {
            event_id,
            user_id,
            command,
        }
    }
}

/// What a store read while holding the event's lock.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationSnapshot<'a> {
    pub event: EventRef,
    pub confirmed: i64,
    pub existing: Option<&'a Registration>,
    pub user_live: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationWrite {
    Insert,
    Update {
        id: RegistrationId,
        status: RegistrationStatus,
    },
}

impl RegistrationWrite {
    pub const fn status(&self) -> RegistrationStatus {
        match *self {
            Self::Insert => RegistrationStatus::Confirmed,
            Self::Update { status, .. } => status,
        }
    }
}

/// Capacity is inclusive: `capacity` confirmed rows are allowed.
pub fn has_free_slot(capacity: i32, confirmed: i64) -> bool {
    confirmed < i64::from(capacity)
}

pub fn decide(
    request: &RegistrationRequest,
    snapshot: &RegistrationSnapshot<'_>,
) -> CoreResult<RegistrationWrite> {
    if !snapshot.event.exists {
        return Err(CoreError::not_found("event not found"));
    }

    match request.command {
        RegistrationCommand::Register => {
            if !snapshot.user_live {
                return Err(CoreError::not_found("user not found"));
            }
            if let Some(r) = snapshot.existing {
                if r.status == RegistrationStatus::Confirmed {
                    return Err(CoreError::conflict("already registered for this event"));
                }
            }
            if !has_free_slot(snapshot.event.capacity, snapshot.confirmed) {
                return Err(CoreError::conflict("capacity exhausted"));
            }
            Ok(match snapshot.existing {
                Some(r) => RegistrationWrite::Update {
                    id: r.id,
                    status: RegistrationStatus::Confirmed,
                },
                None => RegistrationWrite::Insert,
            })
        }
        RegistrationCommand::Cancel => {
            let r = snapshot
                .existing
                .ok_or_else(|| CoreError::not_found("registration not found"))?;
            if r.status != RegistrationStatus::Confirmed {
                return Err(CoreError::invalid(
                    "only confirmed registrations can be canceled",
                ));
            }
            Ok(RegistrationWrite::Update {
                id: r.id,
                status: RegistrationStatus::Canceled,
            })
        }
        RegistrationCommand::RejectByHost { host_id } => {
            if snapshot.event.host_id != host_id {
                return Err(CoreError::invalid("only the event host can reject participants"));
            }
            let r = snapshot
                .existing
                .ok_or_else(|| CoreError::not_found("registration not found"))?;
            if r.status != RegistrationStatus::Confirmed {
                return Err(CoreError::invalid(
                    "only confirmed participants can be rejected",
                ));
            }
            Ok(RegistrationWrite::Update {
                id: r.id,
                status: RegistrationStatus::Rejected,
            })
        }
    }
}
