//! Access policy for permission mutations on a document.
//!
//! Pure decision logic: no I/O, no clock. Rules are evaluated in order and the
//! first matching rule wins.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{access::AccessLevel, ids::UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessAction {
    Read,
    Share,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    NoAccess,
    ViewerCannotChangePermissions,
    CannotChangeOwnPermissions,
    CannotRemoveCreator,
    CannotRemoveSelf,
    MissingRemovePermission,
}

impl DenyReason {
    /// User-facing sentence, surfaced verbatim next to the action control.
    pub fn message(self) -> &'static str {
        match self {
            DenyReason::NoAccess => "You don't have access to this document.",
            DenyReason::ViewerCannotChangePermissions => "Viewers cannot change permissions.",
            DenyReason::CannotChangeOwnPermissions => "You cannot change your own permissions.",
            DenyReason::CannotRemoveCreator => "Cannot remove the document creator.",
            DenyReason::CannotRemoveSelf => "You cannot remove yourself from the document.",
            DenyReason::MissingRemovePermission => {
                "You don't have permission to remove users from this document."
            }
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            DenyReason::NoAccess => "NO_ACCESS",
            DenyReason::ViewerCannotChangePermissions => "VIEWER_CANNOT_CHANGE_PERMISSIONS",
            DenyReason::CannotChangeOwnPermissions => "CANNOT_CHANGE_OWN_PERMISSIONS",
            DenyReason::CannotRemoveCreator => "CANNOT_REMOVE_CREATOR",
            DenyReason::CannotRemoveSelf => "CANNOT_REMOVE_SELF",
            DenyReason::MissingRemovePermission => "MISSING_REMOVE_PERMISSION",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Everything the policy needs to know about one requested mutation.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub action: AccessAction,
    pub actor_id: &'a UserId,
    pub actor_level: &'a AccessLevel,
    pub target_id: &'a UserId,
    pub creator_id: &'a UserId,
}

pub fn decide(request: &AccessRequest<'_>) -> Decision {
    let AccessRequest {
        action,
        actor_id,
        actor_level,
        target_id,
        creator_id,
    } = *request;

    if matches!(actor_level, AccessLevel::None) {
        return Decision::Deny(DenyReason::NoAccess);
    }

    if action == AccessAction::Read {
        return Decision::Allow;
    }

    if matches!(actor_level, AccessLevel::Viewer(_)) {
        return Decision::Deny(DenyReason::ViewerCannotChangePermissions);
    }

    if action == AccessAction::Share && target_id == actor_id {
        return Decision::Deny(DenyReason::CannotChangeOwnPermissions);
    }

    if action == AccessAction::Remove {
        if target_id == creator_id {
            return Decision::Deny(DenyReason::CannotRemoveCreator);
        }
        if target_id == actor_id {
            return Decision::Deny(DenyReason::CannotRemoveSelf);
        }
        if !actor_level.is_owner() && !actor_level.has_write() {
            return Decision::Deny(DenyReason::MissingRemovePermission);
        }
    }

    Decision::Allow
}
