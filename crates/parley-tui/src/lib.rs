//! Terminal UI for Parley
//!
//! A thin shell over [`parley_app::Driver`] that provides terminal-specific
//! I/O. All orchestration logic lives in the generic [`parley_app::Runtime`].
//!
//! This crate only handles terminal rendering, the network tasks behind
//! each I/O request, and the production [`SystemEnv`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod system_env;
pub mod terminal;
pub mod ui;

pub use parley_app::{App, AppAction, AppEvent, Bridge, Driver, KeyInput, Runtime};
pub use system_env::SystemEnv;
pub use terminal::{TerminalDriver, TerminalError};
