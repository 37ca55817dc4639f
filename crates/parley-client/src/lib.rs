//! Client
//!
//! Action-based session state machine for one Parley room visit. Tracks the
//! connection lifecycle, the conversation log, presence and typing, file
//! transfers, and the local participant's role.
//!
//! # Architecture
//!
//! The client follows the Sans-IO pattern of [`parley_core`]. It receives
//! events ([`ClientEvent`]), processes them through pure state machine logic,
//! and returns actions ([`ClientAction`]) for the caller to execute.
//!
//! # Components
//!
//! - [`Client`]: Top-level state machine
//! - [`conversation::Conversation`]: Message log, presence, and typing reducer
//! - [`dispatcher::Dispatcher`]: Outbound validation and typing debounce
//! - [`transfer::TransferCoordinator`]: Upload and download bookkeeping
//! - [`permissions::Permissions`]: Role-derived moderation rights
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::open_channel`]: Open the room WebSocket
//! - [`transport::HttpClient`]: Health probe, file transfer, and export

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
pub mod conversation;
pub mod dispatcher;
mod error;
mod event;
pub mod permissions;
pub mod session;
pub mod transfer;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::{Client, ClientConfig, classify_connect_error, close_reason};
pub use conversation::{Conversation, ConversationEvent, TypingSet};
pub use dispatcher::DispatchConfig;
pub use error::{ClientError, TransferError};
pub use event::{ClientAction, ClientEvent, NoticeLevel, SessionEndReason};
pub use parley_core::{
    ConnectionConfig, ConnectionState, Environment, FailureReason, Identity, RoomCode,
};
pub use permissions::Permissions;
pub use session::{RoomMetadata, Session};
pub use transfer::{TransferConfig, UploadId, UploadState, UploadTask};
