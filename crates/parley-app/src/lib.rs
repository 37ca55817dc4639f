//! Application layer for Parley
//!
//! Pure state machines and generic runtime for UI and session orchestration,
//! enabling deterministic simulation testing with the same code that runs in
//! production.
//!
//! # Components
//!
//! - [`App`]: UI state machine (entry form, composer, commands, confirmations)
//! - [`Bridge`]: Session bridge (translates App actions to Client events)
//! - [`Driver`]: Trait for platform-specific I/O abstraction
//! - [`Runtime`]: Generic orchestration loop using Driver
//! - [`prefs`]: Remembered identity, room, and role
//! - [`present`]: Status and label wording shared by frontends

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod app;
mod bridge;
pub mod commands;
mod driver;
mod event;
mod input;
pub mod prefs;
pub mod present;
mod runtime;
mod state;
mod view;

pub use action::AppAction;
pub use app::App;
pub use bridge::Bridge;
pub use commands::Command;
pub use driver::{Driver, Input, IoRequest};
pub use event::AppEvent;
pub use input::{KeyInput, LineEditor};
pub use prefs::{MemoryPrefs, PrefUpdate, Prefs, PrefsError, RedbPrefs, SavedSession};
pub use runtime::Runtime;
pub use state::{Confirmation, EntryField, EntryForm, NOTIFICATION_TICKS, Notification, Page};
pub use view::{RetryProgress, SessionView};
