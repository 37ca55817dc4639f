//! Error types for the Parley core.

use std::{io, time::Duration};

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors from the connection lifecycle state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Operation not valid in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// State when the operation was attempted
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// The server forced the session closed; only a fresh join can recover
    #[error("session terminated by server")]
    Terminated,

    /// Server refused or was unreachable
    #[error("connection refused: {0}")]
    Refused(String),

    /// An attempt did not complete in time
    #[error("connection attempt timed out after {elapsed:?}")]
    Timeout {
        /// How long the attempt ran
        elapsed: Duration,
    },

    /// Frame could not be encoded or decoded
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying transport failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Returns true if the error is recoverable by retrying.
    ///
    /// Connectivity failures are transient. A forced disconnect, an invalid
    /// transition, or a malformed frame is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Refused(_) | Self::Timeout { .. } | Self::Transport(_))
    }
}

impl From<parley_proto::ProtocolError> for ConnectionError {
    fn from(err: parley_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => {
                Self::Refused(err.to_string())
            },
            io::ErrorKind::TimedOut => Self::Timeout { elapsed: Duration::ZERO },
            _ => Self::Transport(err.to_string()),
        }
    }
}

/// Rejected display identity or room code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Blank after trimming
    #[error("{field} must not be empty")]
    Empty {
        /// Which input was rejected
        field: &'static str,
    },

    /// Longer than allowed
    #[error("{field} must be at most {max} characters (got {len})")]
    TooLong {
        /// Which input was rejected
        field: &'static str,
        /// Limit in characters
        max: usize,
        /// Actual length in characters
        len: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_errors_are_transient() {
        assert!(ConnectionError::Refused("econnrefused".into()).is_transient());
        assert!(ConnectionError::Timeout { elapsed: Duration::from_secs(20) }.is_transient());
        assert!(ConnectionError::Transport("reset".into()).is_transient());
    }

    #[test]
    fn session_and_protocol_errors_are_fatal() {
        assert!(!ConnectionError::Terminated.is_transient());
        assert!(!ConnectionError::Protocol("bad json".into()).is_transient());
        assert!(
            !ConnectionError::InvalidState {
                state: ConnectionState::Connected,
                operation: "connect",
            }
            .is_transient()
        );
    }

    #[test]
    fn io_errors_are_classified() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert!(matches!(ConnectionError::from(refused), ConnectionError::Refused(_)));

        let timeout = io::Error::from(io::ErrorKind::TimedOut);
        assert!(matches!(ConnectionError::from(timeout), ConnectionError::Timeout { .. }));
    }
}
