//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the terminal driver but for
//! deterministic testing. It implements [`Driver`] so the same
//! [`parley_app::Runtime`] orchestration code runs in both production and
//! simulation. I/O requests are answered by an in-memory [`SimRelay`].

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use parley_app::{App, AppEvent, Driver, Input, IoRequest, KeyInput, Page, SessionView, present};
use parley_client::ClientEvent;
use parley_core::{CloseReason, Environment};
use parley_proto::{HealthResponse, NetworkInfo};

use crate::{
    sim_env::{SimEnv, SimInstant},
    sim_relay::{ConnId, SimRelay},
    world::SIM_SERVER_IP,
};

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// What the last render showed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRecord {
    /// Screen
    pub page: Page,
    /// Status line, when a session is active
    pub status: Option<String>,
    /// Messages in the log, when a session is active
    pub message_count: Option<usize>,
}

/// Shared state for input injection.
///
/// This allows injection and inspection from outside async contexts.
#[derive(Default)]
struct SharedState {
    /// Scripted user input, consumed in order
    script: VecDeque<Input<SimInstant>>,
    /// I/O outcomes, delivered before the next scripted input
    network: VecDeque<Input<SimInstant>>,
    performed: Vec<IoRequest>,
    renders: usize,
    last_render: Option<RenderRecord>,
    relay: SimRelay,
    conn: Option<ConnId>,
    files: BTreeMap<String, u64>,
    stopped: bool,
}

/// Simulation driver for deterministic testing.
///
/// Clones share state, so a test keeps one handle for injection and
/// inspection while the [`parley_app::Runtime`] owns the other.
#[derive(Clone)]
pub struct SimDriver {
    env: SimEnv,
    state: Arc<Mutex<SharedState>>,
}

impl SimDriver {
    /// Driver backed by a fresh relay.
    pub fn new(env: SimEnv) -> Self {
        Self::with_relay(env, SimRelay::new())
    }

    /// Driver backed by `relay`.
    pub fn with_relay(env: SimEnv, relay: SimRelay) -> Self {
        let state = SharedState { relay, ..SharedState::default() };
        Self { env, state: Arc::new(Mutex::new(state)) }
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an `AppEvent` for processing.
    pub fn inject_event(&self, event: AppEvent) {
        self.lock().script.push_back(Input::App(event));
    }

    /// Queue a key press.
    pub fn inject_key(&self, key: KeyInput) {
        self.inject_event(AppEvent::Key(key));
    }

    /// Queue one key press per character.
    pub fn type_text(&self, text: &str) {
        for c in text.chars() {
            self.inject_key(KeyInput::Char(c));
        }
    }

    /// Queue a line followed by Enter.
    pub fn type_line(&self, text: &str) {
        self.type_text(text);
        self.inject_key(KeyInput::Enter);
    }

    /// Queue a tick event.
    pub fn inject_tick(&self) {
        self.inject_event(AppEvent::Tick);
    }

    /// Make a local file available to uploads.
    pub fn add_file(&self, path: &str, size: u64) {
        self.lock().files.insert(path.to_string(), size);
    }

    /// Every I/O request performed so far.
    pub fn performed(&self) -> Vec<IoRequest> {
        self.lock().performed.clone()
    }

    /// Number of renders.
    pub fn renders(&self) -> usize {
        self.lock().renders
    }

    /// What the last render showed.
    pub fn last_render(&self) -> Option<RenderRecord> {
        self.lock().last_render.clone()
    }

    /// Whether the runtime stopped the driver.
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Inspect or modify the relay.
    pub fn with_relay_mut<R>(&self, f: impl FnOnce(&mut SimRelay) -> R) -> R {
        f(&mut self.lock().relay)
    }

    /// Close the channel from the server side.
    pub fn force_disconnect(&self) {
        let mut state = self.lock();
        if let Some(conn) = state.conn {
            state.relay.force_close(conn);
        }
        pump(&mut state);
    }

    fn respond(&self, state: &mut SharedState, request: IoRequest) {
        match request {
            IoRequest::Send(frame) => {
                if let Some(conn) = state.conn {
                    state.relay.receive(conn, frame);
                }
            },
            IoRequest::ProbeHealth { probe_id } => {
                let health =
                    Some(HealthResponse { status: "ok".into(), ip: Some(SIM_SERVER_IP.into()) });
                state.network.push_back(client(ClientEvent::ProbeCompleted { probe_id, health }));
            },
            IoRequest::OpenChannel { .. } => {
                if let Some(old) = state.conn.take() {
                    state.relay.disconnect(old);
                }
                state.conn = Some(state.relay.connect());
                state.network.push_back(client(ClientEvent::ChannelOpened));
            },
            IoRequest::CloseChannel => {
                if let Some(conn) = state.conn.take() {
                    state.relay.disconnect(conn);
                }
            },
            IoRequest::FetchNetworkInfo => {
                let info = NetworkInfo { ip: SIM_SERVER_IP.into() };
                state.network.push_back(client(ClientEvent::NetworkInfoReceived(info)));
            },
            IoRequest::InspectFile { path } => match state.files.get(&path) {
                Some(&size) => {
                    let filename = path.rsplit('/').next().unwrap_or(&path).to_string();
                    state.network.push_back(client(ClientEvent::UploadFile {
                        source: path,
                        filename,
                        size,
                    }));
                },
                None => {
                    state.network.push_back(Input::App(AppEvent::error(format!("Cannot read {path}"))));
                },
            },
            IoRequest::StartUpload { upload, source, .. } => {
                let total = state.files.get(&source).copied().unwrap_or_default();
                state.network.push_back(client(ClientEvent::UploadProgress { upload, sent: total, total }));
                state.network.push_back(client(ClientEvent::UploadCompleted { upload }));
            },
            IoRequest::Download { filename, .. } => {
                state.network.push_back(Input::App(AppEvent::info(format!("Saved {filename}"))));
            },
            IoRequest::Export(request) => {
                state.network.push_back(Input::App(AppEvent::info(format!(
                    "Exported {} messages",
                    request.messages.len()
                ))));
            },
        }
    }
}

fn client(event: ClientEvent<SimInstant>) -> Input<SimInstant> {
    Input::Client(event)
}

/// Move relay output for the open channel into the network queue.
fn pump(state: &mut SharedState) {
    let Some(conn) = state.conn else {
        return;
    };
    for frame in state.relay.drain(conn) {
        state.network.push_back(client(ClientEvent::FrameReceived(frame)));
    }
    if state.relay.is_closed_by_server(conn) {
        state.relay.reap(conn);
        state.conn = None;
        state.network.push_back(client(ClientEvent::ChannelClosed(CloseReason::ServerForced)));
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = SimInstant;

    async fn poll(&mut self) -> Result<Option<Input<SimInstant>>, Self::Error> {
        let mut state = self.lock();
        pump(&mut state);
        Ok(state.network.pop_front().or_else(|| state.script.pop_front()))
    }

    async fn perform(&mut self, request: IoRequest) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if state.stopped {
            return Err(SimDriverError("driver stopped".into()));
        }
        state.performed.push(request.clone());
        self.respond(&mut state, request);
        pump(&mut state);
        Ok(())
    }

    fn now(&self) -> SimInstant {
        self.env.now()
    }

    fn render(&mut self, app: &App, session: Option<&dyn SessionView>) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.renders += 1;
        state.last_render = Some(RenderRecord {
            page: app.page().clone(),
            status: session.map(|s| present::status_text(s, app.server_url())),
            message_count: session.map(|s| s.messages().len()),
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.lock().stopped = true;
    }
}
