//! Observable UI state.
//!
//! These structures are the "View Model" for everything the session does not
//! own: the entry form, pending confirmations, and transient notifications.
//! Conversation data is read through [`crate::SessionView`].

use parley_client::NoticeLevel;
use parley_core::MAX_NAME_LEN;

use crate::input::LineEditor;

/// Which screen is showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    /// Name and room entry.
    Entry,
    /// Inside a room.
    Chat,
}

/// Entry form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryField {
    /// Display name
    Name,
    /// Room code
    Room,
}

/// The entry form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryForm {
    /// Display name input
    pub name: LineEditor,
    /// Room code input
    pub room: LineEditor,
    /// Focused field
    pub focus: EntryField,
    /// Validation error from the last submit
    pub error: Option<String>,
}

impl Default for EntryForm {
    fn default() -> Self {
        Self {
            name: LineEditor::with_limit(MAX_NAME_LEN),
            room: LineEditor::with_limit(MAX_NAME_LEN),
            focus: EntryField::Name,
            error: None,
        }
    }
}

impl EntryForm {
    /// Pre-fill from a remembered session.
    pub fn prefilled(name: &str, room: &str) -> Self {
        let mut form = Self::default();
        form.name = form.name.with_text(name);
        form.room = form.room.with_text(room);
        if !form.name.is_empty() {
            form.focus = EntryField::Room;
        }
        form
    }

    /// Editor of the focused field.
    pub fn focused_mut(&mut self) -> &mut LineEditor {
        match self.focus {
            EntryField::Name => &mut self.name,
            EntryField::Room => &mut self.room,
        }
    }

    /// Move focus to the other field.
    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            EntryField::Name => EntryField::Room,
            EntryField::Room => EntryField::Name,
        };
    }
}

/// A destructive action waiting for a yes/no.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Leave the room
    Leave,
    /// Delete a shared file
    DeleteFile {
        /// File name or key as typed
        file: String,
    },
    /// Remove a participant
    Kick {
        /// Display name
        user: String,
    },
}

impl Confirmation {
    /// Question to show.
    pub fn prompt(&self) -> String {
        match self {
            Self::Leave => "Leave this room? (y/n)".to_string(),
            Self::DeleteFile { file } => format!("Delete {file} for everyone? (y/n)"),
            Self::Kick { user } => format!("Remove {user} from the room? (y/n)"),
        }
    }
}

/// Ticks a notification stays visible.
pub const NOTIFICATION_TICKS: u32 = 50;

/// A transient toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity
    pub level: NoticeLevel,
    /// Text
    pub message: String,
    /// Ticks until it disappears
    pub ticks_left: u32,
}
