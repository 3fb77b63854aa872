//! Authorization Gate.
//!
//! A pure decision function: given the request's [`Actor`] and the operation it
//! attempts, answer allow or deny. Handlers call [`authorize`] explicitly before
//! touching the store, and before looking the target up, so a denied caller
//! learns nothing about whether the resource exists.

use crate::{auth::Actor, error::AppError};

/// Operations that need a permission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreatePost,
    EditPost(i64),
    DeletePost(i64),
    CreateComment(i64),
    /// Changing another account's role.
    ManageRoles,
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No session is bound to the request and the operation needs one.
    Unauthenticated,
    /// The actor is known but lacks the capability.
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Converts a denial into the error the HTTP layer reports.
    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::Unauthenticated) => Err(AppError::Unauthorized),
            Decision::Deny(DenyReason::Forbidden) => Err(AppError::Forbidden),
        }
    }
}

/// authorize
///
/// Post management and role changes require an administrator; post ownership is
/// not consulted, so any administrator may edit or delete any post.
/// Commenting requires only an authenticated actor.
pub fn authorize(actor: &Actor, operation: Operation) -> Decision {
    match operation {
        Operation::CreatePost
        | Operation::EditPost(_)
        | Operation::DeletePost(_)
        | Operation::ManageRoles => match actor.user() {
            Some(user) if user.is_administrator() => Decision::Allow,
            _ => Decision::Deny(DenyReason::Forbidden),
        },
        Operation::CreateComment(_) => match actor {
            Actor::Authenticated(_) => Decision::Allow,
            Actor::Anonymous => Decision::Deny(DenyReason::Unauthenticated),
        },
    }
}
