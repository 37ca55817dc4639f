//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the system at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use std::collections::BTreeMap;

use parley_client::{Client, ConnectionState, Environment};
use parley_proto::{MessageId, Role};
use serde::Serialize;

use crate::sim_relay::RelayRoom;

/// Snapshot of the entire system state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemSnapshot {
    /// Per-client state snapshots.
    pub clients: Vec<ClientSnapshot>,
    /// Relay's view of the room, when a relay takes part.
    pub relay: Option<RelaySnapshot>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no clients).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot with a single client.
    pub fn single(client: ClientSnapshot) -> Self {
        Self { clients: vec![client], relay: None }
    }

    /// Create a snapshot from multiple clients.
    pub fn from_clients(clients: Vec<ClientSnapshot>) -> Self {
        Self { clients, relay: None }
    }

    /// Attach the relay's view.
    #[must_use]
    pub fn with_relay(mut self, relay: RelaySnapshot) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Clients that are connected, joined, and have history.
    pub fn settled_clients(&self) -> impl Iterator<Item = &ClientSnapshot> {
        self.clients
            .iter()
            .filter(|c| !c.ended && c.state == ConnectionState::Connected && c.loaded)
    }
}

/// Snapshot of a single client's observable state.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSnapshot {
    /// Display name.
    pub name: String,
    /// Connection status.
    #[serde(serialize_with = "serialize_debug")]
    pub state: ConnectionState,
    /// Session over for good.
    pub ended: bool,
    /// Local role.
    pub role: Role,
    /// History arrived.
    pub loaded: bool,
    /// Message log ids, in order.
    pub message_ids: Vec<MessageId>,
    /// Presence list.
    pub users: Vec<String>,
    /// Typing set, in start order.
    pub typing: Vec<String>,
    /// Progress of each in-flight upload.
    pub upload_progress: Vec<u8>,
}

impl ClientSnapshot {
    /// Capture a live client.
    pub fn from_client<E: Environment>(client: &Client<E>) -> Self {
        let conversation = client.conversation();
        Self {
            name: client.session().identity().as_str().to_string(),
            state: client.state(),
            ended: client.has_ended(),
            role: client.role(),
            loaded: conversation.is_loaded(),
            message_ids: conversation.messages().iter().map(|m| m.id.clone()).collect(),
            users: conversation.users().to_vec(),
            typing: conversation.typing().names().map(str::to_string).collect(),
            upload_progress: client.transfers().uploads().iter().map(|u| u.progress).collect(),
        }
    }
}

/// Snapshot of the relay's room state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelaySnapshot {
    /// History ids, in order.
    pub message_ids: Vec<MessageId>,
    /// Connected display names.
    pub users: Vec<String>,
    /// Role held for each participant.
    pub roles: BTreeMap<String, Role>,
}

impl RelaySnapshot {
    /// Capture a relay room.
    pub fn from_room(room: &RelayRoom) -> Self {
        let users = room.users();
        let roles = users.iter().map(|u| (u.clone(), room.role_of(u))).collect();
        Self { message_ids: room.messages().iter().map(|m| m.id.clone()).collect(), users, roles }
    }
}

fn serialize_debug<T: std::fmt::Debug, S: serde::Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format_args!("{value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(name: &str, state: ConnectionState, loaded: bool) -> ClientSnapshot {
        ClientSnapshot {
            name: name.into(),
            state,
            ended: false,
            role: Role::Member,
            loaded,
            message_ids: Vec::new(),
            users: Vec::new(),
            typing: Vec::new(),
            upload_progress: Vec::new(),
        }
    }

    #[test]
    fn empty_snapshot() {
        let snapshot = SystemSnapshot::empty();
        assert!(snapshot.clients.is_empty());
        assert!(snapshot.relay.is_none());
    }

    #[test]
    fn settled_clients_skip_disconnected_and_unloaded() {
        let snapshot = SystemSnapshot::from_clients(vec![
            client("a", ConnectionState::Connected, true),
            client("b", ConnectionState::Reconnecting, true),
            client("c", ConnectionState::Connected, false),
        ]);
        let names: Vec<_> = snapshot.settled_clients().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }
}
