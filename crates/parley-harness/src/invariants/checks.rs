//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.
//!
//! The convergence checks only look at settled clients (connected, joined,
//! history loaded) and are meant to run once the simulation is quiet.

use std::collections::HashSet;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// A message id appears at most once in a client's log.
///
/// History replay after a reconnect must not duplicate live deliveries.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "unique_message_ids"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let mut seen = HashSet::new();
            if let Some(dup) = client.message_ids.iter().find(|id| !seen.insert(*id)) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("client {}: message {dup} appears twice", client.name),
                });
            }
        }
        Ok(())
    }
}

/// A client never shows itself as typing.
pub struct TypingExcludesSelf;

impl Invariant for TypingExcludesSelf {
    fn name(&self) -> &'static str {
        "typing_excludes_self"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if client.typing.contains(&client.name) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("client {} lists itself as typing", client.name),
                });
            }
        }
        Ok(())
    }
}

/// Upload progress stays within 0..=100.
pub struct UploadProgressBounded;

impl Invariant for UploadProgressBounded {
    fn name(&self) -> &'static str {
        "upload_progress_bounded"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if let Some(p) = client.upload_progress.iter().find(|p| **p > 100) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("client {}: upload progress {p}%", client.name),
                });
            }
        }
        Ok(())
    }
}

/// Settled clients hold the same log as the relay.
///
/// Without a relay in the snapshot, settled clients must agree with each
/// other.
pub struct LogConvergence;

impl Invariant for LogConvergence {
    fn name(&self) -> &'static str {
        "log_convergence"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut settled = state.settled_clients();
        let reference = match &state.relay {
            Some(relay) => ("relay".to_string(), relay.message_ids.clone()),
            None => match settled.next() {
                Some(first) => (first.name.clone(), first.message_ids.clone()),
                None => return Ok(()),
            },
        };

        for client in settled {
            if client.message_ids != reference.1 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {} log {:?} differs from {} log {:?}",
                        client.name, client.message_ids, reference.0, reference.1
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Settled clients see the relay's presence list.
pub struct PresenceConvergence;

impl Invariant for PresenceConvergence {
    fn name(&self) -> &'static str {
        "presence_convergence"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let Some(relay) = &state.relay else {
            return Ok(());
        };
        for client in state.settled_clients() {
            if client.users != relay.users {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {} sees users {:?}, relay has {:?}",
                        client.name, client.users, relay.users
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A settled client's role matches the relay's record.
pub struct RoleConsistency;

impl Invariant for RoleConsistency {
    fn name(&self) -> &'static str {
        "role_consistency"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let Some(relay) = &state.relay else {
            return Ok(());
        };
        for client in state.settled_clients() {
            let Some(expected) = relay.roles.get(&client.name) else {
                continue;
            };
            if client.role != *expected {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {} believes it is {}, relay says {}",
                        client.name, client.role, expected
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use parley_client::ConnectionState;
    use parley_proto::{MessageId, Role};

    use super::*;
    use crate::invariants::{ClientSnapshot, RelaySnapshot};

    fn settled(name: &str, ids: &[u64]) -> ClientSnapshot {
        ClientSnapshot {
            name: name.into(),
            state: ConnectionState::Connected,
            ended: false,
            role: Role::Member,
            loaded: true,
            message_ids: ids.iter().map(|i| MessageId::from(*i)).collect(),
            users: vec!["a".into(), "b".into()],
            typing: Vec::new(),
            upload_progress: Vec::new(),
        }
    }

    #[test]
    fn duplicate_ids_are_caught() {
        let snapshot = SystemSnapshot::single(settled("a", &[1, 2, 1]));
        assert!(UniqueMessageIds.check(&snapshot).is_err());
    }

    #[test]
    fn self_typing_is_caught() {
        let mut client = settled("a", &[]);
        client.typing.push("a".into());
        assert!(TypingExcludesSelf.check(&SystemSnapshot::single(client)).is_err());
    }

    #[test]
    fn divergent_logs_are_caught() {
        let snapshot = SystemSnapshot::from_clients(vec![settled("a", &[1, 2]), settled("b", &[1])]);
        assert!(LogConvergence.check(&snapshot).is_err());

        let snapshot = SystemSnapshot::from_clients(vec![settled("a", &[1, 2]), settled("b", &[1, 2])]);
        assert!(LogConvergence.check(&snapshot).is_ok());
    }

    #[test]
    fn unsettled_clients_are_ignored() {
        let mut behind = settled("b", &[1]);
        behind.state = ConnectionState::Reconnecting;
        let relay = RelaySnapshot {
            message_ids: vec![MessageId::from(1u64), MessageId::from(2u64)],
            users: vec!["a".into(), "b".into()],
            ..RelaySnapshot::default()
        };
        let snapshot =
            SystemSnapshot::from_clients(vec![settled("a", &[1, 2]), behind]).with_relay(relay);
        assert!(LogConvergence.check(&snapshot).is_ok());
        assert!(PresenceConvergence.check(&snapshot).is_ok());
    }

    #[test]
    fn stale_role_is_caught() {
        let relay = RelaySnapshot {
            roles: [("a".to_string(), Role::CoLeader)].into_iter().collect(),
            ..RelaySnapshot::default()
        };
        let snapshot = SystemSnapshot::single(settled("a", &[])).with_relay(relay);
        assert!(RoleConsistency.check(&snapshot).is_err());
    }
}
