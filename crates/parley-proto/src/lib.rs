//! Parley wire protocol.
//!
//! Typed representation of every named event exchanged over the room channel,
//! plus the payloads of the auxiliary HTTP endpoints (health, info, export).
//!
//! # Encoding
//!
//! Each event travels as one JSON text message:
//!
//! ```text
//! {"event": "<camelCaseName>", "data": <payload>}
//! ```
//!
//! Events without a payload omit `data`. Outbound events (client to server)
//! are [`ClientFrame`]s, inbound events are [`ServerFrame`]s. Connection
//! lifecycle signals (open, close, connect error) are transport-level and are
//! not part of this crate.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
pub mod frames;
pub mod http;
pub mod message;
pub mod role;

pub use errors::{ProtocolError, Result};
pub use frames::{
    AssignRole, ClientFrame, DownloadUrl, ErrorNotice, FileDeleted, FileRef, FileUploaded,
    JoinRoom, KickUser, RoleAssigned, RoomInfo, ServerFrame, UploadRequest, UploadSlot,
    UserKicked,
};
pub use http::{ExportRequest, HealthResponse, NetworkInfo};
pub use message::{FileAttachment, MessageId, MessageKind, MessageRecord};
pub use role::Role;
