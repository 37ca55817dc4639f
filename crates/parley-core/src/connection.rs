//! Channel lifecycle state machine.
//!
//! Owns the connect / disconnect / reconnect cycle for one room visit. Uses
//! the action pattern: methods take the current time as input and return
//! actions for the driver to execute. No I/O, no timers; the driver calls
//! [`ConnectionManager::tick`] periodically.
//!
//! # State Machine
//!
//! ```text
//!                 connect          open
//! ┌──────────────┐──────>┌────────────┐──────>┌───────────┐
//! │ Disconnected │       │ Connecting │       │ Connected │
//! └──────────────┘<──┐   └────────────┘       └───────────┘
//!        │ retry due │         │ error              │ drop
//!        ↓           │         ↓                    ↓
//! ┌──────────────┐   └── ┌──────────────┐    ┌──────────────┐
//! │ Reconnecting │<──────│ Reconnecting │    │ Disconnected │
//! └──────────────┘       └──────────────┘    └──────────────┘
//!        │ retries exhausted / forced disconnect
//!        ↓
//!   ┌────────┐
//!   │ Failed │
//!   └────────┘
//! ```
//!
//! Every successful open emits exactly one [`ConnectionAction::AnnounceJoin`]:
//! the server does not carry membership across a dropped channel.

use std::{
    fmt::Debug,
    ops::Sub,
    time::{Duration, Instant},
};

use crate::error::ConnectionError;

/// Automatic retries before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Delay before the first retry. Later retries grow linearly.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound on the delay between retries.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Time allowed for a single open attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(20);

/// Time allowed for the pre-connect health probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection lifecycle configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Automatic retries before [`ConnectionState::Failed`]
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Cap on the retry delay
    pub max_backoff: Duration,
    /// Per-attempt timeout
    pub attempt_timeout: Duration,
    /// Health probe timeout
    pub probe_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Delay before retry number `attempt` (1-based), linear and capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff.saturating_mul(attempt.max(1)).min(self.max_backoff)
    }
}

/// Connectivity status visible to the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Health probe or first open in progress
    Connecting,
    /// Channel open and room joined
    Connected,
    /// No channel. A retry may be scheduled.
    Disconnected,
    /// Automatic retry cycle in progress
    Reconnecting,
    /// Gave up, or the server forced the session closed
    Failed,
}

/// Why the channel closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Local teardown; never retried
    ClientRequested,
    /// Server kicked the channel; terminal for the session
    ServerForced,
    /// Network drop or transport error; retried automatically
    Transport(String),
}

/// Classification of a failed open attempt, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectErrorKind {
    /// Server refused the connection or was unreachable
    Refused,
    /// Attempt exceeded its timeout
    Timeout,
    /// Anything else
    Other,
}

impl ConnectErrorKind {
    /// Short human-readable description.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Refused => "server unreachable",
            Self::Timeout => "connection timed out",
            Self::Other => "connection error",
        }
    }
}

/// Why the manager entered [`ConnectionState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// Retries exhausted before the channel was ever open
    ConnectFailed,
    /// Retries exhausted after an established channel dropped
    ReconnectFailed,
    /// Server-initiated disconnect; not eligible for retry
    ServerForced,
}

impl FailureReason {
    /// Whether the session must be restarted from the entry screen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ServerForced)
    }
}

/// Actions returned by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Issue a best-effort health probe, then report it via
    /// [`ConnectionManager::probe_result`]
    ProbeHealth {
        /// Correlates the result with this probe
        probe_id: u64,
    },
    /// Open the channel
    Open {
        /// 0 for the first attempt of a cycle, otherwise the retry number
        attempt: u32,
    },
    /// Close the channel if one is open or opening
    Close,
    /// Announce room membership on the freshly opened channel
    AnnounceJoin,
    /// Status changed; dependents should refresh
    StatusChanged {
        /// Previous state
        from: ConnectionState,
        /// New state
        to: ConnectionState,
    },
}

#[derive(Debug, Clone, Copy)]
struct Pending<I> {
    since: I,
    wait: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Probe<I> {
    id: u64,
    since: I,
}

/// Channel lifecycle state machine.
///
/// Generic over `Instant` so simulations can drive it on virtual time.
#[derive(Debug, Clone)]
pub struct ConnectionManager<I = Instant>
where
    I: Copy + Ord + Debug + Send + Sync + Sub<Output = Duration>,
{
    state: ConnectionState,
    config: ConnectionConfig,
    /// Open attempts made in the current cycle beyond the first
    attempt: u32,
    probe: Option<Probe<I>>,
    next_probe_id: u64,
    /// Start of the open attempt in flight
    opening_since: Option<I>,
    retry: Option<Pending<I>>,
    ever_connected: bool,
    server_reachable: Option<bool>,
    last_error: Option<ConnectErrorKind>,
    disconnect_reason: Option<String>,
    failure: Option<FailureReason>,
}

impl<I> ConnectionManager<I>
where
    I: Copy + Ord + Debug + Send + Sync + Sub<Output = Duration>,
{
    /// Create a manager in [`ConnectionState::Disconnected`] with no channel.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            attempt: 0,
            probe: None,
            next_probe_id: 1,
            opening_since: None,
            retry: None,
            ever_connected: false,
            server_reachable: None,
            last_error: None,
            disconnect_reason: None,
            failure: None,
        }
    }

    /// Current status.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Configuration in use.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Retry number in progress or scheduled next, 0 outside a retry cycle.
    pub fn attempt(&self) -> u32 {
        self.attempt + u32::from(self.retry.is_some() && self.state == ConnectionState::Reconnecting)
    }

    /// Why the manager failed, if it did.
    pub fn failure(&self) -> Option<FailureReason> {
        self.failure
    }

    /// Most recent open failure since the last successful open.
    pub fn last_error(&self) -> Option<ConnectErrorKind> {
        self.last_error
    }

    /// Reason reported for the most recent drop.
    pub fn disconnect_reason(&self) -> Option<&str> {
        self.disconnect_reason.as_deref()
    }

    /// Outcome of the last completed health probe. `None` before any.
    pub fn server_reachable(&self) -> Option<bool> {
        self.server_reachable
    }

    /// Whether a channel was ever successfully opened.
    pub fn ever_connected(&self) -> bool {
        self.ever_connected
    }

    /// Whether the server forced the session closed.
    pub fn is_terminated(&self) -> bool {
        self.failure.is_some_and(FailureReason::is_terminal)
    }

    /// Begin a connection: probe the server, then open the channel.
    ///
    /// The probe is best-effort. Its result (or timeout) only affects the
    /// reported reachability; the open happens either way.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::Terminated` after a forced disconnect
    /// - `ConnectionError::InvalidState` if a channel is open or opening
    pub fn connect(&mut self, now: I) -> Result<Vec<ConnectionAction>, ConnectionError> {
        self.ensure_not_terminated()?;

        if !matches!(self.state, ConnectionState::Disconnected | ConnectionState::Failed) {
            return Err(ConnectionError::InvalidState { state: self.state, operation: "connect" });
        }

        self.reset_cycle();

        let probe_id = self.next_probe_id;
        self.next_probe_id += 1;
        self.probe = Some(Probe { id: probe_id, since: now });

        let mut actions = Vec::new();
        self.transition(ConnectionState::Connecting, &mut actions);
        actions.push(ConnectionAction::ProbeHealth { probe_id });
        Ok(actions)
    }

    /// Report a health probe outcome.
    ///
    /// Results for probes that already timed out or were superseded are
    /// ignored, so a late answer never overrides a later status.
    pub fn probe_result(&mut self, probe_id: u64, reachable: bool, now: I) -> Vec<ConnectionAction> {
        match self.probe {
            Some(probe) if probe.id == probe_id => {},
            _ => {
                tracing::debug!(probe_id, reachable, "ignoring stale health probe result");
                return Vec::new();
            },
        }

        self.probe = None;
        self.server_reachable = Some(reachable);
        if !reachable {
            tracing::warn!("health probe failed, connecting anyway");
        }

        vec![self.begin_open(now)]
    }

    /// Drive timeouts and scheduled retries.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        if let Some(probe) = self.probe {
            if now - probe.since >= self.config.probe_timeout {
                tracing::warn!(probe_id = probe.id, "health probe timed out");
                self.probe = None;
                self.server_reachable = Some(false);
                actions.push(self.begin_open(now));
            }
            return actions;
        }

        if let Some(since) = self.opening_since {
            let elapsed = now - since;
            if elapsed >= self.config.attempt_timeout {
                tracing::warn!(?elapsed, attempt = self.attempt, "open attempt timed out");
                actions.push(ConnectionAction::Close);
                actions.extend(self.handle_connect_error(ConnectErrorKind::Timeout, now));
            }
            return actions;
        }

        if let Some(retry) = self.retry {
            if now - retry.since >= retry.wait {
                self.retry = None;
                self.attempt += 1;
                tracing::info!(attempt = self.attempt, max = self.config.max_retries, "reconnecting");
                self.transition(ConnectionState::Reconnecting, &mut actions);
                actions.push(self.begin_open(now));
            }
        }

        actions
    }

    /// The channel opened.
    ///
    /// Moves to [`ConnectionState::Connected`] and emits exactly one
    /// [`ConnectionAction::AnnounceJoin`]. A duplicate open is ignored; an
    /// open that lands after teardown is closed again.
    pub fn handle_open(&mut self, _now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Connected => {
                tracing::warn!("duplicate open signal ignored");
                Vec::new()
            },
            ConnectionState::Connecting | ConnectionState::Reconnecting
                if self.opening_since.is_some() =>
            {
                self.opening_since = None;
                self.retry = None;
                self.probe = None;
                self.attempt = 0;
                self.ever_connected = true;
                self.last_error = None;
                self.disconnect_reason = None;

                let mut actions = Vec::new();
                self.transition(ConnectionState::Connected, &mut actions);
                actions.push(ConnectionAction::AnnounceJoin);
                actions
            },
            state => {
                tracing::debug!(?state, "open signal with no attempt in flight, closing");
                vec![ConnectionAction::Close]
            },
        }
    }

    /// The channel closed.
    pub fn handle_closed(&mut self, reason: CloseReason, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        match reason {
            CloseReason::ServerForced => {
                if !self.is_terminated() {
                    tracing::info!("server forced disconnect");
                    self.disconnect_reason = Some("server disconnect".to_string());
                    self.fail(FailureReason::ServerForced, &mut actions);
                }
            },
            CloseReason::ClientRequested => {
                if self.state != ConnectionState::Failed && !self.is_idle() {
                    self.clear_pending();
                    self.disconnect_reason = Some("client disconnect".to_string());
                    self.transition(ConnectionState::Disconnected, &mut actions);
                }
            },
            CloseReason::Transport(detail) => match self.state {
                ConnectionState::Connected => {
                    tracing::info!(%detail, "channel dropped");
                    self.disconnect_reason = Some(detail);
                    self.attempt = 0;
                    self.transition(ConnectionState::Disconnected, &mut actions);
                    if self.config.max_retries == 0 {
                        self.fail(FailureReason::ReconnectFailed, &mut actions);
                    } else {
                        self.retry = Some(Pending { since: now, wait: self.config.backoff(1) });
                    }
                },
                ConnectionState::Connecting | ConnectionState::Reconnecting
                    if self.opening_since.is_some() =>
                {
                    actions.extend(self.handle_connect_error(ConnectErrorKind::Other, now));
                },
                state => {
                    tracing::debug!(?state, %detail, "close signal with no channel, ignoring");
                },
            },
        }

        actions
    }

    /// An open attempt failed.
    ///
    /// Schedules the next retry, or fails once `max_retries` retries were
    /// spent. Errors with no attempt in flight are ignored.
    pub fn handle_connect_error(&mut self, kind: ConnectErrorKind, now: I) -> Vec<ConnectionAction> {
        if self.opening_since.is_none() {
            tracing::debug!(?kind, "connect error with no attempt in flight, ignoring");
            return Vec::new();
        }

        self.opening_since = None;
        self.last_error = Some(kind);

        let mut actions = Vec::new();
        if self.attempt >= self.config.max_retries {
            let reason = if self.ever_connected {
                FailureReason::ReconnectFailed
            } else {
                FailureReason::ConnectFailed
            };
            tracing::warn!(attempts = self.attempt, ?reason, "giving up on connection");
            self.fail(reason, &mut actions);
        } else {
            let wait = self.config.backoff(self.attempt + 1);
            tracing::debug!(?kind, ?wait, "connect failed, retry scheduled");
            self.retry = Some(Pending { since: now, wait });
            self.transition(ConnectionState::Reconnecting, &mut actions);
        }

        actions
    }

    /// Explicit teardown. Idempotent.
    ///
    /// Cancels any probe, attempt, or scheduled retry. A `Failed` manager
    /// stays failed so a forced disconnect is never masked.
    pub fn disconnect(&mut self, _now: I) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::Failed {
            self.clear_pending();
            return Vec::new();
        }
        if self.is_idle() {
            return Vec::new();
        }

        self.clear_pending();
        self.disconnect_reason = Some("client disconnect".to_string());

        let mut actions = Vec::new();
        self.transition(ConnectionState::Disconnected, &mut actions);
        actions.push(ConnectionAction::Close);
        actions
    }

    /// User-triggered retry.
    ///
    /// Starts a fresh cycle immediately, skipping any scheduled backoff.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::Terminated` after a forced disconnect
    /// - `ConnectionError::InvalidState` if connected or an attempt is in
    ///   flight
    pub fn manual_reconnect(&mut self, now: I) -> Result<Vec<ConnectionAction>, ConnectionError> {
        self.ensure_not_terminated()?;

        if self.state == ConnectionState::Connected
            || self.opening_since.is_some()
            || self.probe.is_some()
        {
            return Err(ConnectionError::InvalidState {
                state: self.state,
                operation: "manual_reconnect",
            });
        }

        self.reset_cycle();

        let mut actions = Vec::new();
        self.transition(ConnectionState::Connecting, &mut actions);
        actions.push(self.begin_open(now));
        Ok(actions)
    }

    fn begin_open(&mut self, now: I) -> ConnectionAction {
        self.opening_since = Some(now);
        ConnectionAction::Open { attempt: self.attempt }
    }

    fn fail(&mut self, reason: FailureReason, actions: &mut Vec<ConnectionAction>) {
        self.clear_pending();
        self.failure = Some(reason);
        self.transition(ConnectionState::Failed, actions);
    }

    fn transition(&mut self, to: ConnectionState, actions: &mut Vec<ConnectionAction>) {
        let from = self.state;
        if from == to {
            return;
        }
        tracing::debug!(?from, ?to, "connection state transition");
        self.state = to;
        actions.push(ConnectionAction::StatusChanged { from, to });
    }

    fn clear_pending(&mut self) {
        self.probe = None;
        self.opening_since = None;
        self.retry = None;
    }

    fn reset_cycle(&mut self) {
        self.clear_pending();
        self.attempt = 0;
        self.failure = None;
        self.last_error = None;
    }

    fn is_idle(&self) -> bool {
        self.state == ConnectionState::Disconnected
            && self.retry.is_none()
            && self.opening_since.is_none()
            && self.probe.is_none()
    }

    fn ensure_not_terminated(&self) -> Result<(), ConnectionError> {
        if self.is_terminated() { Err(ConnectionError::Terminated) } else { Ok(()) }
    }
}
