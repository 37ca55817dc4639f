//! Client error types.

use parley_core::{ConnectionError, ConnectionState, ValidationError};
use parley_proto::Role;
use thiserror::Error;

use crate::transfer::UploadId;

/// Errors from local intents rejected before dispatch.
///
/// None of these leave the session in a different state: the intent is
/// dropped and the caller surfaces the cause to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The channel is not connected
    #[error("not connected ({state:?})")]
    NotConnected {
        /// Connection state at the time
        state: ConnectionState,
    },

    /// Message text was blank after trimming
    #[error("message is empty")]
    EmptyMessage,

    /// Local role does not allow the action
    #[error("{action} requires a higher role than {role}")]
    PermissionDenied {
        /// Attempted action
        action: &'static str,
        /// Current role
        role: Role,
    },

    /// Moderation actions cannot target the local user
    #[error("cannot {action} yourself")]
    SelfTarget {
        /// Attempted action
        action: &'static str,
    },

    /// No message in the log carries this file key
    #[error("unknown file: {key}")]
    UnknownFile {
        /// Storage key
        key: String,
    },

    /// Only the uploader may delete a file
    #[error("only the uploader can delete {key}")]
    NotUploader {
        /// Storage key
        key: String,
    },

    /// The session already ended (left, kicked, or forced out)
    #[error("session has ended")]
    SessionEnded,

    /// File transfer rejected
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Connection lifecycle rejected the operation
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Identity or room code failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Per-file transfer errors. Never affect the conversation log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// File exceeds the configured size limit
    #[error("{filename} is too large ({size} bytes, limit {max})")]
    TooLarge {
        /// File name
        filename: String,
        /// Size in bytes
        size: u64,
        /// Limit in bytes
        max: u64,
    },

    /// Too many uploads in flight
    #[error("too many uploads in progress (limit {max})")]
    TooManyUploads {
        /// Concurrency limit
        max: usize,
    },

    /// Upload id is not in flight
    #[error("unknown upload {0}")]
    UnknownUpload(UploadId),

    /// Upload did not reach the transferring stage
    #[error("upload {0} has no destination yet")]
    NoDestination(UploadId),

    /// Server issued a slot that matches no pending request
    #[error("unmatched upload slot for key {key}")]
    UnmatchedSlot {
        /// Storage key in the slot
        key: String,
    },
}
