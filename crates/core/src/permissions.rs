//! Approval permission policy.
//!
//! Stage approvals, rejections, and the final sign-off are restricted to the
//! elevated laboratory roles. The policy is a pure function of the actor's
//! role; it holds no state and consults nothing else.

use crate::actor::{Actor, Role};

/// Roles allowed to approve stages and finalize cases.
const APPROVER_ROLES: [Role; 2] = [Role::Professor, Role::Admin];

/// Decides whether an actor's role authorizes approval actions.
#[derive(Clone, Copy, Debug, Default)]
pub struct PermissionPolicy;

impl PermissionPolicy {
    pub fn new() -> Self {
        Self
    }

    /// True iff the actor's role is in the elevated approver set.
    pub fn can_approve(&self, actor: &Actor) -> bool {
        APPROVER_ROLES.contains(&actor.role)
    }
}
