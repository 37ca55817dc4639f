//! Application input events.
//!
//! This module defines [`AppEvent`], the inputs that drive the
//! [`crate::App`] state machine.
//!
//! Events originate from two distinct sources:
//! - User interactions (keyboard, resize) and system ticks.
//! - Session notifications translated from the client by the
//!   [`crate::Bridge`].

use parley_client::{ConnectionState, NoticeLevel, SessionEndReason};
use parley_proto::Role;

use crate::KeyInput;

/// Events processed by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Keyboard input.
    Key(KeyInput),

    /// Periodic tick.
    Tick,

    /// Terminal resize (columns, rows).
    Resize(u16, u16),

    /// Connection status changed.
    StatusChanged {
        /// Previous state
        from: ConnectionState,
        /// New state
        to: ConnectionState,
    },

    /// Session state visible in the chat view changed.
    SessionUpdated,

    /// Local role changed.
    RoleChanged(Role),

    /// Room metadata arrived.
    RoomInfo {
        /// History outlives the last participant
        is_persistent: bool,
        /// Retention for persistent rooms
        persistence_days: Option<u32>,
    },

    /// Something to tell the user.
    Notify {
        /// Severity
        level: NoticeLevel,
        /// Text
        message: String,
    },

    /// The session is over for good.
    SessionEnded(SessionEndReason),
}

impl AppEvent {
    /// Error notification.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Notify { level: NoticeLevel::Error, message: message.into() }
    }

    /// Informational notification.
    pub fn info(message: impl Into<String>) -> Self {
        Self::Notify { level: NoticeLevel::Info, message: message.into() }
    }
}
