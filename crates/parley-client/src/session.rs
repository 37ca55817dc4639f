//! Per-visit session state.

use parley_core::{Identity, RoomCode};
use parley_proto::{Role, RoomInfo};

/// Room metadata, fixed for the lifetime of a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMetadata {
    /// History outlives the last participant
    pub is_persistent: bool,
    /// Retention for persistent rooms
    pub persistence_days: Option<u32>,
    /// Creator display name
    pub created_by: Option<String>,
}

/// One user's visit to one room.
///
/// `role` is the single authority for the local role. It only changes in
/// response to server events.
#[derive(Debug, Clone)]
pub struct Session {
    identity: Identity,
    room_code: RoomCode,
    role: Role,
    metadata: Option<RoomMetadata>,
    connection_id: Option<String>,
    server_ip: Option<String>,
}

impl Session {
    /// New session with the default role.
    pub fn new(identity: Identity, room_code: RoomCode) -> Self {
        Self {
            identity,
            room_code,
            role: Role::Member,
            metadata: None,
            connection_id: None,
            server_ip: None,
        }
    }

    /// Local display identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Normalized room code.
    pub fn room_code(&self) -> &RoomCode {
        &self.room_code
    }

    /// Current local role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Room metadata, once received.
    pub fn metadata(&self) -> Option<&RoomMetadata> {
        self.metadata.as_ref()
    }

    /// Connection id of the current channel, if reported.
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Server's externally visible address, if known.
    pub fn server_ip(&self) -> Option<&str> {
        self.server_ip.as_deref()
    }

    /// Record the server address.
    pub fn set_server_ip(&mut self, ip: String) {
        self.server_ip = Some(ip);
    }

    /// Apply a room info event.
    ///
    /// Metadata is kept from the first event of the join. The connection id
    /// follows the latest channel. Returns the new role if it changed.
    pub fn apply_room_info(&mut self, info: RoomInfo) -> Option<Role> {
        if self.metadata.is_none() {
            self.metadata = Some(RoomMetadata {
                is_persistent: info.is_persistent,
                persistence_days: info.persistence_days,
                created_by: info.created_by,
            });
        }
        if info.connection_id.is_some() {
            self.connection_id = info.connection_id;
        }
        self.set_role(info.user_role).then_some(info.user_role)
    }

    /// Update the role. Returns whether it changed.
    pub fn set_role(&mut self, role: Role) -> bool {
        if self.role == role {
            return false;
        }
        tracing::info!(from = %self.role, to = %role, "local role changed");
        self.role = role;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(role: Role, persistent: bool) -> RoomInfo {
        RoomInfo {
            user_role: role,
            is_persistent: persistent,
            persistence_days: persistent.then_some(7),
            created_by: Some("alice".into()),
            connection_id: Some("c-1".into()),
        }
    }

    #[test]
    fn metadata_is_set_once() {
        let mut s = Session::new(Identity::parse("bob").unwrap(), RoomCode::parse("abcd").unwrap());
        s.apply_room_info(info(Role::Member, true));
        s.apply_room_info(info(Role::Member, false));
        assert_eq!(s.metadata().map(|m| m.is_persistent), Some(true));
    }

    #[test]
    fn role_change_is_reported() {
        let mut s = Session::new(Identity::parse("bob").unwrap(), RoomCode::parse("abcd").unwrap());
        assert_eq!(s.apply_room_info(info(Role::Member, false)), None);
        assert_eq!(s.apply_room_info(info(Role::Leader, false)), Some(Role::Leader));
        assert_eq!(s.role(), Role::Leader);
    }
}
