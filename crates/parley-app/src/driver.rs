//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the application runtime from specific I/O
//! implementations. Each frontend implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::{future::Future, ops::Sub, time::Duration};

use parley_client::{ClientEvent, UploadId};
use parley_proto::{ClientFrame, ExportRequest};

use crate::{App, AppEvent, SessionView};

/// One input for the runtime.
#[derive(Debug, Clone)]
pub enum Input<I> {
    /// User interaction, resize, or tick.
    App(AppEvent),
    /// Outcome of an [`IoRequest`], or a frame from the server.
    Client(ClientEvent<I>),
}

/// Side effects the runtime asks the driver to perform.
///
/// Every request that has an outcome reports it later through
/// [`Driver::poll`]; `perform` itself only starts the work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoRequest {
    /// Send a frame on the open channel.
    Send(ClientFrame),

    /// Probe the health endpoint; report `ProbeCompleted`.
    ProbeHealth {
        /// Echo in the completion event
        probe_id: u64,
    },

    /// Open the channel; report `ChannelOpened` or `ConnectFailed`, and
    /// later `FrameReceived` and `ChannelClosed`.
    OpenChannel {
        /// 0 for the first attempt
        attempt: u32,
    },

    /// Close the channel. No `ChannelClosed` follows.
    CloseChannel,

    /// Fetch the server's network info; report `NetworkInfoReceived`.
    FetchNetworkInfo,

    /// Look up a local file; report `UploadFile` or an error notification.
    InspectFile {
        /// Local path as typed
        path: String,
    },

    /// Write a file to its presigned location; report `UploadProgress`
    /// followed by `UploadCompleted` or `UploadFailed`.
    StartUpload {
        /// Upload being started
        upload: UploadId,
        /// Local path
        source: String,
        /// Temporary write target
        presigned_url: String,
        /// MIME type to send
        content_type: String,
    },

    /// Save a resolved file locally; report a notification.
    Download {
        /// Original file name
        filename: String,
        /// Resolved location
        url: String,
    },

    /// Post the transcript for rendering and save the result; report a
    /// notification.
    Export(ExportRequest),
}

/// Abstracts I/O operations for the application runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`Runtime`](crate::Runtime) handles orchestration logic. This ensures
/// the same orchestration code runs in the production TUI and in tests.
///
/// # Implementations
///
/// - **TUI**: crossterm for terminal events, a WebSocket channel and reqwest
///   for transport
/// - **Tests**: scripted inputs and a recorded request log
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Wait for the next input.
    ///
    /// Returns `None` once the input source is exhausted; the runtime then
    /// shuts down.
    fn poll(&mut self) -> impl Future<Output = Result<Option<Input<Self::Instant>>, Self::Error>> + Send;

    /// Start an I/O request.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures of the driver itself. Failures of
    /// the request are reported as inputs.
    fn perform(&mut self, request: IoRequest) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Render the application state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, app: &App, session: Option<&dyn SessionView>) -> Result<(), Self::Error>;

    /// Close connections and clean up resources.
    fn stop(&mut self);
}
