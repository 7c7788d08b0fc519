use crate::{
    error::{CoreError, CoreResult},
    models::{ClubId, ClubRole, Membership, MembershipId, MembershipStatus, UserId},
    rules::roles,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipCommand {
    Apply,
    Cancel,
    Leave,
    Approve { manager_id: UserId },
    Reject { manager_id: UserId },
    Kick { manager_id: UserId },
    ChangeRole { leader_id: UserId, role: ClubRole },
    TransferLeadership { leader_id: UserId },
}

impl MembershipCommand {
    /// The member acting on somebody else's row, if any.
    pub const fn actor(&self) -> Option<UserId> {
        match *self {
            Self::Apply | Self::Cancel | Self::Leave => None,
            Self::Approve { manager_id }
            | Self::Reject { manager_id }
            | Self::Kick { manager_id } => Some(manager_id),
            Self::ChangeRole { leader_id, .. } | Self::TransferLeadership { leader_id } => {
                Some(leader_id)
            }
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Cancel => "cancel",
            Self::Leave => "leave",
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
            Self::Kick { .. } => "kick",
            Self::ChangeRole { .. } => "change_role",
            Self::TransferLeadership { .. } => "transfer_leadership",
        }
    }
}

/// A command aimed at the membership of `user_id` in `club_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipRequest {
    pub club_id: ClubId,
    pub user_id: UserId,
    pub command: MembershipCommand,
}

impl MembershipRequest {
    pub const fn new(club_id: ClubId, user_id: UserId, command: MembershipCommand) -> Self {
        Self {
            club_id,
            user_id,
            command,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipWrite {
    Insert {
        role: ClubRole,
        status: MembershipStatus,
    },
    Update {
        id: MembershipId,
        role: ClubRole,
        status: MembershipStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipDecision {
    /// Persisted before `target`. Only a leadership transfer rewrites the
    /// actor's own row.
    pub actor: Option<MembershipWrite>,
    pub target: MembershipWrite,
}

impl From<MembershipWrite> for MembershipDecision {
    fn from(target: MembershipWrite) -> Self {
        Self {
            actor: None,
            target,
        }
    }
}

fn update(m: &Membership, role: ClubRole, status: MembershipStatus) -> MembershipDecision {
    MembershipWrite::Update {
        id: m.id,
        role,
        status,
    }
    .into()
}

fn existing(target: Option<&Membership>) -> CoreResult<&Membership> {
    target.ok_or_else(|| CoreError::not_found("membership not found"))
}

/// Decides the write for `request` given the target's row and, for
/// manager/leader commands, the actor's row in the same club.
pub fn decide(
    request: &MembershipRequest,
    target: Option<&Membership>,
    actor: Option<&Membership>,
) -> CoreResult<MembershipDecision> {
    match request.command {
        MembershipCommand::Apply => match target {
            None => Ok(MembershipWrite::Insert {
                role: ClubRole::Member,
                status: MembershipStatus::Pending,
            }
            .into()),
            Some(m) if m.status.is_terminal() => {
                Ok(update(m, ClubRole::Member, MembershipStatus::Pending))
            }
            Some(_) => Err(CoreError::conflict("already applied to this club")),
        },
        MembershipCommand::Cancel => {
            let m = existing(target)?;
            if m.status != MembershipStatus::Pending {
                return Err(CoreError::invalid(
                    "only pending applications can be canceled",
                ));
            }
            Ok(update(m, m.role, MembershipStatus::Canceled))
        }
        MembershipCommand::Leave => {
            let m = existing(target)?;
            if m.status != MembershipStatus::Active {
                return Err(CoreError::invalid("only active members can leave"));
            }
            if m.role == ClubRole::Leader {
                return Err(CoreError::invalid(
                    "the club leader cannot leave, transfer leadership first",
                ));
            }
            Ok(update(m, m.role, MembershipStatus::Left))
        }
        MembershipCommand::Approve { .. } | MembershipCommand::Reject { .. } => {
            roles::require_management(actor)?;
            let m = existing(target)?;
            if m.status != MembershipStatus::Pending {
                return Err(CoreError::invalid(
                    "only pending applications can be reviewed",
                ));
            }
            let status = if matches!(request.command, MembershipCommand::Approve { .. }) {
                MembershipStatus::Active
            } else {
                MembershipStatus::Rejected
            };
            Ok(update(m, m.role, status))
        }
        MembershipCommand::Kick { manager_id } => {
            roles::require_management(actor)?;
            if manager_id == request.user_id {
                return Err(CoreError::invalid("cannot kick yourself"));
            }
            let m = existing(target)?;
            if m.status != MembershipStatus::Active {
                return Err(CoreError::invalid("only active members can be kicked"));
            }
            if m.role == ClubRole::Leader {
                return Err(CoreError::invalid("the club leader cannot be kicked"));
            }
            Ok(update(m, m.role, MembershipStatus::Left))
        }
        MembershipCommand::ChangeRole { role, .. } => {
            roles::require_leader(actor)?;
            let m = existing(target)?;
            if m.status != MembershipStatus::Active {
                return Err(CoreError::invalid("only active members can change role"));
            }
            if m.role == ClubRole::Leader {
                return Err(CoreError::invalid("the club leader's role cannot be changed"));
            }
            if role == ClubRole::Leader {
                return Err(CoreError::invalid(
                    "a new leader is appointed through leadership transfer",
                ));
            }
            Ok(update(m, role, m.status))
        }
        MembershipCommand::TransferLeadership { leader_id } => {
            let leader = roles::require_leader(actor)?;
            if leader_id == request.user_id {
                return Err(CoreError::invalid("already the club leader"));
            }
            let m = existing(target)?;
            if m.status != MembershipStatus::Active {
                return Err(CoreError::invalid(
                    "leadership can only pass to an active member",
                ));
            }
            Ok(MembershipDecision {
                actor: Some(MembershipWrite::Update {
                    id: leader.id,
                    role: ClubRole::Manager,
                    status: MembershipStatus::Active,
                }),
                target: MembershipWrite::Update {
                    id: m.id,
                    role: ClubRole::Leader,
                    status: MembershipStatus::Active,
                },
            })
        }
    }
}

/// Rejects a request whose club, or whose applicant for `Apply`, is gone.
/// Liveness must be read inside the unit of work that writes the row.
pub fn check_parents(
    request: &MembershipRequest,
    club_live: bool,
    applicant_live: bool,
) -> CoreResult<()> {
    if !club_live {
        return Err(CoreError::not_found("club not found"));
    }
    if request.command == MembershipCommand::Apply && !applicant_live {
        return Err(CoreError::not_found("user not found"));
    }
    Ok(())
}
