//! Read-only view of a live session for renderers.
//!
//! Renderers never see the [`Client`] type itself, only this trait, so the
//! rendering code does not depend on the environment type parameter and can
//! be driven by any session source in tests.

use parley_client::{
    Client, ConnectionState, Environment, FailureReason, Identity, Permissions, RoomCode,
    RoomMetadata, UploadTask,
};
use parley_proto::{MessageRecord, Role};

/// Reconnection progress, for status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryProgress {
    /// Current attempt, 1-based
    pub attempt: u32,
    /// Configured retry limit
    pub max: u32,
}

/// What a renderer may read from a session.
pub trait SessionView {
    /// Local display identity.
    fn identity(&self) -> &Identity;

    /// Room being visited.
    fn room_code(&self) -> &RoomCode;

    /// Connection status.
    fn connection_state(&self) -> ConnectionState;

    /// Why the session failed, if it did.
    fn failure(&self) -> Option<FailureReason>;

    /// Last disconnect cause.
    fn disconnect_reason(&self) -> Option<&str>;

    /// Retry progress while reconnecting.
    fn retry_progress(&self) -> RetryProgress;

    /// Local role.
    fn role(&self) -> Role;

    /// Moderation rights.
    fn permissions(&self) -> Permissions;

    /// Room metadata, once known.
    fn metadata(&self) -> Option<&RoomMetadata>;

    /// Server's externally visible address.
    fn server_ip(&self) -> Option<&str>;

    /// Message log.
    fn messages(&self) -> &[MessageRecord];

    /// Whether history has arrived.
    fn is_loaded(&self) -> bool;

    /// Online participants.
    fn users(&self) -> &[String];

    /// Participants typing, in start order.
    fn typing(&self) -> Vec<&str>;

    /// Whether `message` was authored locally.
    fn is_own(&self, message: &MessageRecord) -> bool;

    /// Whether the local user may delete `message`'s file.
    fn can_delete(&self, message: &MessageRecord) -> bool;

    /// Uploads in flight.
    fn uploads(&self) -> &[UploadTask];
}

impl<E: Environment> SessionView for Client<E> {
    fn identity(&self) -> &Identity {
        self.session().identity()
    }

    fn room_code(&self) -> &RoomCode {
        self.session().room_code()
    }

    fn connection_state(&self) -> ConnectionState {
        self.state()
    }

    fn failure(&self) -> Option<FailureReason> {
        self.connection().failure()
    }

    fn disconnect_reason(&self) -> Option<&str> {
        self.connection().disconnect_reason()
    }

    fn retry_progress(&self) -> RetryProgress {
        RetryProgress {
            attempt: self.connection().attempt(),
            max: self.connection().config().max_retries,
        }
    }

    fn role(&self) -> Role {
        Client::role(self)
    }

    fn permissions(&self) -> Permissions {
        Client::permissions(self)
    }

    fn metadata(&self) -> Option<&RoomMetadata> {
        self.session().metadata()
    }

    fn server_ip(&self) -> Option<&str> {
        self.session().server_ip()
    }

    fn messages(&self) -> &[MessageRecord] {
        self.conversation().messages()
    }

    fn is_loaded(&self) -> bool {
        self.conversation().is_loaded()
    }

    fn users(&self) -> &[String] {
        self.conversation().users()
    }

    fn typing(&self) -> Vec<&str> {
        self.conversation().typing().names().collect()
    }

    fn is_own(&self, message: &MessageRecord) -> bool {
        Client::is_own(self, message)
    }

    fn can_delete(&self, message: &MessageRecord) -> bool {
        Client::can_delete(self, message)
    }

    fn uploads(&self) -> &[UploadTask] {
        self.transfers().uploads()
    }
}
