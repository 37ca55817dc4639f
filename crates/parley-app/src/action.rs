//! Application side-effects and intents.
//!
//! This module defines the [`AppAction`] enum, which represents instructions
//! produced by the [`crate::App`] state machine for the runtime to execute.

use parley_core::{Identity, RoomCode};
use parley_proto::Role;

use crate::prefs::PrefUpdate;

/// Actions produced by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// Render the UI.
    Render,

    /// Quit the application.
    Quit,

    /// Start a session.
    Join {
        /// Validated display name
        identity: Identity,
        /// Normalized room code
        room_code: RoomCode,
    },

    /// Post a message.
    SendMessage(String),

    /// A keystroke in the composer.
    Typing,

    /// Leave the room.
    Leave,

    /// Retry after a failed connection.
    Retry,

    /// Upload a local file.
    Upload {
        /// Local path
        path: String,
    },

    /// Fetch a shared file.
    Download {
        /// File name or storage key
        file: String,
    },

    /// Delete a shared file.
    DeleteFile {
        /// File name or storage key
        file: String,
    },

    /// Remove a participant.
    Kick {
        /// Display name
        user: String,
    },

    /// Change a participant's role.
    AssignRole {
        /// Display name
        user: String,
        /// New role
        role: Role,
    },

    /// Export the transcript.
    Export,

    /// Update persisted preferences.
    Persist(PrefUpdate),
}
