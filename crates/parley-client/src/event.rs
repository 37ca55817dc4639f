//! Client events and actions.

use parley_core::{CloseReason, ConnectErrorKind, ConnectionState};
use parley_proto::{ClientFrame, ExportRequest, HealthResponse, NetworkInfo, Role, ServerFrame};

use crate::transfer::UploadId;

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Executing channel and HTTP actions and reporting their outcome
/// - Decoding inbound frames
/// - Driving time forward via ticks
/// - Forwarding user intents
///
/// Generic over `I` (Instant type) so simulations can use virtual time.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// Start the session: probe the server, then open the channel.
    Connect,

    /// Health probe finished. `None` if it failed.
    ProbeCompleted {
        /// Probe being answered
        probe_id: u64,
        /// Parsed health response
        health: Option<HealthResponse>,
    },

    /// Channel opened.
    ChannelOpened,

    /// Channel closed.
    ChannelClosed(CloseReason),

    /// Open attempt failed.
    ConnectFailed(ConnectErrorKind),

    /// Frame received from the server.
    FrameReceived(ServerFrame),

    /// Server's externally visible address.
    NetworkInfoReceived(NetworkInfo),

    /// Time tick for timeouts, debounce, and typing expiry.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// Post a text message.
    SendMessage(String),

    /// Local keystroke in the message input.
    Typing,

    /// Leave the room: announce, close, end the session.
    LeaveRoom,

    /// Close the channel without leaving (navigation away).
    Disconnect,

    /// User-triggered retry.
    ManualReconnect,

    /// Upload a local file.
    UploadFile {
        /// Opaque handle the driver uses to read the file (usually a path)
        source: String,
        /// File name shown to others
        filename: String,
        /// Size in bytes
        size: u64,
    },

    /// Bytes sent so far for an upload.
    UploadProgress {
        /// Upload being reported
        upload: UploadId,
        /// Bytes sent
        sent: u64,
        /// Total bytes
        total: u64,
    },

    /// Upload finished writing to its destination.
    UploadCompleted {
        /// Upload being reported
        upload: UploadId,
    },

    /// Upload failed.
    UploadFailed {
        /// Upload being reported
        upload: UploadId,
        /// Human-readable cause
        reason: String,
    },

    /// Resolve and open a file from the log.
    DownloadFile {
        /// Storage key
        key: String,
    },

    /// Delete a file this user uploaded.
    DeleteFile {
        /// Storage key
        key: String,
    },

    /// Remove a participant.
    KickUser {
        /// Display name
        target: String,
    },

    /// Change a participant's role.
    AssignRole {
        /// Display name
        target: String,
        /// Role to assign
        role: Role,
    },

    /// Request a rendered transcript of the log.
    ExportTranscript,
}

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeLevel {
    /// Informational
    Info,
    /// Something went wrong but the session continues
    Warning,
    /// An action failed
    Error,
}

/// Why a session ended for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEndReason {
    /// The user left
    Left,
    /// A moderator removed the user
    Kicked {
        /// Server-provided notice
        message: String,
    },
    /// The server closed the channel and refused retry
    ForcedDisconnect,
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Send a frame on the channel.
    Send(ClientFrame),

    /// Probe `GET /health`, then report [`ClientEvent::ProbeCompleted`].
    ProbeHealth {
        /// Echo in the completion event
        probe_id: u64,
    },

    /// Open the channel, then report `ChannelOpened` or `ConnectFailed`.
    OpenChannel {
        /// 0 for the first attempt, otherwise the retry number
        attempt: u32,
    },

    /// Close the channel.
    CloseChannel,

    /// Fetch `GET /info` and report [`ClientEvent::NetworkInfoReceived`].
    FetchNetworkInfo,

    /// Write the file to its destination, reporting progress.
    StartUpload {
        /// Upload being started
        upload: UploadId,
        /// Handle given in [`ClientEvent::UploadFile`]
        source: String,
        /// Temporary write target
        presigned_url: String,
        /// MIME type to send
        content_type: String,
    },

    /// A download location is ready for a file the user asked for.
    DownloadReady {
        /// Storage key
        key: String,
        /// Original file name
        filename: String,
        /// Resolved location
        url: String,
    },

    /// Post the transcript to the export endpoint.
    Export(ExportRequest),

    /// Connectivity status changed.
    StatusChanged {
        /// Previous state
        from: ConnectionState,
        /// New state
        to: ConnectionState,
    },

    /// The local user's role changed.
    RoleChanged(Role),

    /// Show a notification.
    Notify {
        /// Severity
        level: NoticeLevel,
        /// Text
        message: String,
    },

    /// The session is over; return to the entry screen.
    SessionEnded(SessionEndReason),
}
