//! Multi-client simulation world.
//!
//! `SimWorld` wires several [`Client`]s to one [`SimRelay`] through a shared
//! [`SimEnv`]. It executes every client action the way a real driver would
//! (health probes, channel opens, frame sends, uploads) but synchronously,
//! so a test can script joins, partitions, and time jumps and then inspect
//! every client at a quiet point.

use std::{collections::VecDeque, time::Duration};

use parley_client::{
    Client, ClientAction, ClientConfig, ClientError, ClientEvent, Identity, RoomCode,
};
use parley_core::{CloseReason, ConnectErrorKind, Environment};
use parley_proto::{ClientFrame, ExportRequest, HealthResponse, NetworkInfo};

use crate::{
    invariants::{ClientSnapshot, InvariantRegistry, RelaySnapshot, SystemSnapshot},
    sim_env::{SimEnv, SimInstant},
    sim_relay::{ConnId, SimRelay},
};

/// Index of a client in the world.
pub type ClientId = usize;

/// Address the simulated server reports for itself.
pub const SIM_SERVER_IP: &str = "203.0.113.7";

/// Upper bound on delivery rounds before `settle` gives up.
const MAX_SETTLE_ROUNDS: usize = 1_000;

/// One simulated participant and its recorded side effects.
pub struct SimClient {
    client: Client<SimEnv>,
    conn: Option<ConnId>,
    reachable: bool,
    inbox: VecDeque<ClientEvent<SimInstant>>,
    sent: Vec<ClientFrame>,
    actions: Vec<ClientAction>,
    downloads: Vec<(String, String)>,
    exports: Vec<ExportRequest>,
}

impl SimClient {
    /// The session state machine.
    pub fn client(&self) -> &Client<SimEnv> {
        &self.client
    }

    /// Every frame the client tried to send, including dropped ones.
    pub fn sent(&self) -> &[ClientFrame] {
        &self.sent
    }

    /// Every action the client produced.
    pub fn actions(&self) -> &[ClientAction] {
        &self.actions
    }

    /// Resolved downloads as (file name, location).
    pub fn downloads(&self) -> &[(String, String)] {
        &self.downloads
    }

    /// Export requests issued.
    pub fn exports(&self) -> &[ExportRequest] {
        &self.exports
    }

    /// Whether a channel to the relay is open.
    pub fn is_attached(&self) -> bool {
        self.conn.is_some()
    }
}

/// Simulation of several clients sharing one relay and one clock.
pub struct SimWorld {
    env: SimEnv,
    relay: SimRelay,
    room_code: RoomCode,
    config: ClientConfig,
    clients: Vec<SimClient>,
    invariants: Option<InvariantRegistry>,
}

impl SimWorld {
    /// World for `room` with a default relay and seed 0.
    ///
    /// # Errors
    ///
    /// Returns an error if `room` is not a valid room code.
    pub fn new(room: &str) -> Result<Self, ClientError> {
        Self::with_relay(room, SimRelay::new(), 0)
    }

    /// World with an explicit relay and seed.
    ///
    /// # Errors
    ///
    /// Returns an error if `room` is not a valid room code.
    pub fn with_relay(room: &str, relay: SimRelay, seed: u64) -> Result<Self, ClientError> {
        Ok(Self {
            env: SimEnv::with_seed(seed),
            relay,
            room_code: RoomCode::parse(room)?,
            config: ClientConfig::default(),
            clients: Vec::new(),
            invariants: None,
        })
    }

    /// Use `config` for clients added after this call.
    #[must_use]
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Check `registry` after every settle.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// Add a participant. Nothing happens until [`SimWorld::join`].
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a valid identity.
    pub fn add_client(&mut self, name: &str) -> Result<ClientId, ClientError> {
        let identity = Identity::parse(name)?;
        let client =
            Client::new(self.env.clone(), identity, self.room_code.clone(), self.config.clone());
        self.clients.push(SimClient {
            client,
            conn: None,
            reachable: true,
            inbox: VecDeque::new(),
            sent: Vec::new(),
            actions: Vec::new(),
            downloads: Vec::new(),
            exports: Vec::new(),
        });
        Ok(self.clients.len() - 1)
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether the world has no participants.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// A participant.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not returned by [`SimWorld::add_client`].
    pub fn get(&self, id: ClientId) -> &SimClient {
        &self.clients[id]
    }

    /// Shorthand for the participant's session state machine.
    pub fn client(&self, id: ClientId) -> &Client<SimEnv> {
        &self.clients[id].client
    }

    /// The relay.
    pub fn relay(&self) -> &SimRelay {
        &self.relay
    }

    /// The relay, for injecting server-side events.
    pub fn relay_mut(&mut self) -> &mut SimRelay {
        &mut self.relay
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Connect a participant and deliver until quiet.
    ///
    /// # Errors
    ///
    /// Returns the client's error if it cannot start connecting.
    pub fn join(&mut self, id: ClientId) -> Result<(), ClientError> {
        self.handle(id, ClientEvent::Connect)?;
        self.settle();
        Ok(())
    }

    /// Feed one event to a participant and execute the resulting actions.
    /// Follow-up events (probe answers, channel opens, frames) are queued
    /// for [`SimWorld::settle`].
    ///
    /// # Errors
    ///
    /// Returns the client's error unchanged.
    pub fn handle(
        &mut self,
        id: ClientId,
        event: ClientEvent<SimInstant>,
    ) -> Result<(), ClientError> {
        let actions = self.clients[id].client.handle(event)?;
        self.execute(id, actions);
        Ok(())
    }

    /// Deliver queued events and relay frames until nothing moves.
    ///
    /// Returns the number of delivery rounds.
    pub fn settle(&mut self) -> usize {
        let mut rounds = 0;
        while rounds < MAX_SETTLE_ROUNDS && self.step() {
            rounds += 1;
        }
        if rounds == MAX_SETTLE_ROUNDS {
            tracing::warn!(rounds, "simulation did not settle");
        }
        if let Some(registry) = &self.invariants {
            registry.assert_all(&self.snapshot(), "after settle");
        }
        rounds
    }

    /// Move time forward, tick every client, and settle.
    pub fn advance(&mut self, duration: Duration) {
        let now = self.env.advance(duration);
        for id in 0..self.clients.len() {
            self.deliver(id, ClientEvent::Tick { now });
        }
        self.settle();
    }

    /// Advance in `step` increments until `total` has elapsed.
    pub fn advance_by_steps(&mut self, total: Duration, step: Duration) {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            self.advance(step);
            elapsed += step;
        }
    }

    /// Cut a participant off the network. Its channel drops and retries
    /// fail until [`SimWorld::heal`].
    pub fn partition(&mut self, id: ClientId) {
        let sim = &mut self.clients[id];
        sim.reachable = false;
        if let Some(conn) = sim.conn.take() {
            self.relay.disconnect(conn);
            self.deliver(id, ClientEvent::ChannelClosed(CloseReason::Transport(
                "network unreachable".to_string(),
            )));
        }
    }

    /// Restore a participant's network.
    pub fn heal(&mut self, id: ClientId) {
        self.clients[id].reachable = true;
    }

    /// Close a participant's channel from the server side.
    pub fn force_disconnect(&mut self, id: ClientId) {
        if let Some(conn) = self.clients[id].conn {
            self.relay.force_close(conn);
        }
    }

    /// Snapshot every client and the relay's room.
    pub fn snapshot(&self) -> SystemSnapshot {
        let clients = self.clients.iter().map(|c| ClientSnapshot::from_client(&c.client)).collect();
        let snapshot = SystemSnapshot::from_clients(clients);
        match self.relay.room(self.room_code.as_str()) {
            Some(room) => snapshot.with_relay(RelaySnapshot::from_room(room)),
            None => snapshot,
        }
    }

    /// One delivery round. Returns whether anything was delivered.
    fn step(&mut self) -> bool {
        let mut progressed = false;

        for id in 0..self.clients.len() {
            while let Some(event) = self.clients[id].inbox.pop_front() {
                self.deliver(id, event);
                progressed = true;
            }

            let Some(conn) = self.clients[id].conn else {
                continue;
            };
            for frame in self.relay.drain(conn) {
                self.deliver(id, ClientEvent::FrameReceived(frame));
                progressed = true;
            }
            if self.relay.is_closed_by_server(conn) && self.clients[id].conn == Some(conn) {
                self.relay.reap(conn);
                self.clients[id].conn = None;
                self.deliver(id, ClientEvent::ChannelClosed(CloseReason::ServerForced));
                progressed = true;
            }
        }

        progressed
    }

    /// Handle an event produced by the world itself, logging rejections.
    fn deliver(&mut self, id: ClientId, event: ClientEvent<SimInstant>) {
        if let Err(e) = self.handle(id, event) {
            tracing::debug!(client = id, error = %e, "event rejected");
        }
    }

    fn execute(&mut self, id: ClientId, actions: Vec<ClientAction>) {
        let Self { relay, clients, .. } = self;
        let sim = &mut clients[id];

        for action in actions {
            sim.actions.push(action.clone());
            match action {
                ClientAction::Send(frame) => {
                    sim.sent.push(frame.clone());
                    match sim.conn {
                        Some(conn) if sim.reachable => relay.receive(conn, frame),
                        _ => tracing::debug!(client = id, event = frame.name(), "frame dropped"),
                    }
                },
                ClientAction::ProbeHealth { probe_id } => {
                    let health = sim.reachable.then(|| HealthResponse {
                        status: "ok".to_string(),
                        ip: Some(SIM_SERVER_IP.to_string()),
                    });
                    sim.inbox.push_back(ClientEvent::ProbeCompleted { probe_id, health });
                },
                ClientAction::OpenChannel { attempt } => {
                    if sim.reachable {
                        if let Some(old) = sim.conn.take() {
                            relay.disconnect(old);
                        }
                        sim.conn = Some(relay.connect());
                        sim.inbox.push_back(ClientEvent::ChannelOpened);
                    } else {
                        tracing::debug!(client = id, attempt, "open refused");
                        sim.inbox.push_back(ClientEvent::ConnectFailed(ConnectErrorKind::Refused));
                    }
                },
                ClientAction::CloseChannel => {
                    if let Some(conn) = sim.conn.take() {
                        relay.disconnect(conn);
                    }
                },
                ClientAction::FetchNetworkInfo => {
                    if sim.reachable {
                        let info = NetworkInfo { ip: SIM_SERVER_IP.to_string() };
                        sim.inbox.push_back(ClientEvent::NetworkInfoReceived(info));
                    }
                },
                ClientAction::StartUpload { upload, .. } => {
                    let total = sim
                        .client
                        .transfers()
                        .uploads()
                        .iter()
                        .find(|u| u.id == upload)
                        .map_or(0, |u| u.size);
                    sim.inbox.push_back(ClientEvent::UploadProgress {
                        upload,
                        sent: total / 2,
                        total,
                    });
                    sim.inbox.push_back(ClientEvent::UploadProgress { upload, sent: total, total });
                    sim.inbox.push_back(ClientEvent::UploadCompleted { upload });
                },
                ClientAction::DownloadReady { filename, url, .. } => {
                    sim.downloads.push((filename, url));
                },
                ClientAction::Export(request) => sim.exports.push(request),
                ClientAction::StatusChanged { .. }
                | ClientAction::RoleChanged(_)
                | ClientAction::Notify { .. }
                | ClientAction::SessionEnded(_) => {},
            }
        }
    }
}
