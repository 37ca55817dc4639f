//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(String),

    /// Text message is not a known event or has a malformed payload.
    #[error("failed to decode event: {0}")]
    Decode(String),

    /// Channel delivered a binary message where text was expected.
    #[error("unexpected binary message of {0} bytes")]
    UnexpectedBinary(usize),
}
