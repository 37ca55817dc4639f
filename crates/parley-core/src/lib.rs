//! Parley core primitives.
//!
//! Pure building blocks shared by the client and application layers:
//!
//! - [`env::Environment`]: time and randomness, injected so simulations can
//!   run on virtual time
//! - [`connection::ConnectionManager`]: channel lifecycle with bounded
//!   reconnection, driven by events and returning actions
//! - [`room`]: validated display identities and room codes

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod room;

pub use connection::{
    CloseReason, ConnectErrorKind, ConnectionAction, ConnectionConfig, ConnectionManager,
    ConnectionState, FailureReason,
};
pub use env::Environment;
pub use error::{ConnectionError, ValidationError};
pub use room::{Identity, MAX_NAME_LEN, RoomCode};
