//! Role/permission view.
//!
//! Derives the moderation actions available to the local user from the last
//! role the server assigned. The server remains authoritative; this only
//! stops obviously unauthorized frames from being sent.

use parley_core::Identity;
use parley_proto::Role;

use crate::error::ClientError;

/// Moderation capabilities for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    role: Role,
}

impl Permissions {
    /// Capabilities of `role`.
    pub fn for_role(role: Role) -> Self {
        Self { role }
    }

    /// Role the capabilities derive from.
    pub fn role(self) -> Role {
        self.role
    }

    /// Leaders and co-leaders may remove participants.
    pub fn can_kick(self) -> bool {
        matches!(self.role, Role::Leader | Role::CoLeader)
    }

    /// Leaders and co-leaders may change roles.
    pub fn can_assign_roles(self) -> bool {
        matches!(self.role, Role::Leader | Role::CoLeader)
    }

    /// Whether `new_role` may be handed out. Leadership transfers need the
    /// leader.
    pub fn can_assign(self, new_role: Role) -> bool {
        match new_role {
            Role::Leader => self.role == Role::Leader,
            Role::CoLeader | Role::Member => self.can_assign_roles(),
        }
    }

    /// Check a kick against the local role and identity.
    pub fn check_kick(self, me: &Identity, target: &str) -> Result<(), ClientError> {
        if !self.can_kick() {
            return Err(ClientError::PermissionDenied { action: "kick", role: self.role });
        }
        if me.is(target) {
            return Err(ClientError::SelfTarget { action: "kick" });
        }
        Ok(())
    }

    /// Check a role assignment against the local role and identity.
    pub fn check_assign(self, me: &Identity, target: &str, new_role: Role) -> Result<(), ClientError> {
        if !self.can_assign_roles() {
            return Err(ClientError::PermissionDenied { action: "assign roles", role: self.role });
        }
        if !self.can_assign(new_role) {
            return Err(ClientError::PermissionDenied { action: "transfer leadership", role: self.role });
        }
        if me.is(target) {
            return Err(ClientError::SelfTarget { action: "change the role of" });
        }
        Ok(())
    }
}
