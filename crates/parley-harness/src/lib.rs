//! Deterministic simulation harness for Parley.
//!
//! Everything here runs without sockets or wall-clock time: [`SimEnv`]
//! supplies virtual time and seeded randomness, [`SimRelay`] plays the chat
//! server, [`SimWorld`] drives several clients against it, and [`SimDriver`]
//! lets the production [`parley_app::Runtime`] run against the same relay.
//! [`invariants`] checks properties that must hold at every quiet point.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_relay;
pub mod world;

pub use invariants::{Invariant, InvariantRegistry, SystemSnapshot, Violation};
pub use sim_driver::{RenderRecord, SimDriver, SimDriverError};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_relay::{ConnId, RelayConfig, RelayRoom, SimRelay};
pub use world::{ClientId, SIM_SERVER_IP, SimClient, SimWorld};
