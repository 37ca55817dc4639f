//! Session-to-Application translation layer.
//!
//! The [`Bridge`] owns the [`parley_client::Client`] for the current room
//! visit and adapts it to the application lifecycle.
//!
//! # Responsibilities
//!
//! - Creates a client on join and drops it when the session ends.
//! - Converts [`crate::AppAction`]s into client events, resolving file names
//!   typed by the user into storage keys.
//! - Accumulates [`IoRequest`]s for the driver to perform in the next I/O
//!   cycle.
//! - Interprets client actions and converts them into [`crate::AppEvent`]s.
//! - Forwards time ticks generically to support both real time and
//!   deterministic simulation.

use parley_client::{
    Client, ClientAction, ClientConfig, ClientError, ClientEvent, Environment, Identity, RoomCode,
};
use parley_proto::{MessageKind, MessageRecord, ServerFrame};

use crate::{AppAction, AppEvent, IoRequest, SessionView};

/// Bridge between App and Client session logic.
///
/// Generic over Environment to support both production and simulation.
/// The Instant type is determined by the Environment's associated type.
pub struct Bridge<E: Environment> {
    env: E,
    config: ClientConfig,
    client: Option<Client<E>>,
    io: Vec<IoRequest>,
}

impl<E: Environment> Bridge<E> {
    /// Create a Bridge with no active session.
    pub fn new(env: E, config: ClientConfig) -> Self {
        Self { env, config, client: None, io: Vec::new() }
    }

    /// Client for the current visit, if any.
    pub fn client(&self) -> Option<&Client<E>> {
        self.client.as_ref()
    }

    /// Current visit as seen by renderers.
    pub fn view(&self) -> Option<&dyn SessionView> {
        self.client.as_ref().map(|c| c as &dyn SessionView)
    }

    /// Take pending I/O requests.
    pub fn take_io(&mut self) -> Vec<IoRequest> {
        std::mem::take(&mut self.io)
    }

    /// Process an App action and return resulting App events.
    pub fn process_app_action(&mut self, action: AppAction) -> Vec<AppEvent> {
        match action {
            AppAction::Join { identity, room_code } => self.join(identity, room_code),
            AppAction::SendMessage(text) => self.forward(ClientEvent::SendMessage(text)),
            AppAction::Typing => self.forward(ClientEvent::Typing),
            AppAction::Leave => self.forward(ClientEvent::LeaveRoom),
            AppAction::Retry => self.forward(ClientEvent::ManualReconnect),
            AppAction::Upload { path } => {
                if self.client.is_none() {
                    return vec![AppEvent::error(ClientError::SessionEnded.to_string())];
                }
                self.io.push(IoRequest::InspectFile { path });
                vec![]
            },
            AppAction::Download { file } => match self.resolve_file(&file) {
                Some(key) => self.forward(ClientEvent::DownloadFile { key }),
                None => vec![AppEvent::error(format!("No shared file named {file}"))],
            },
            AppAction::DeleteFile { file } => match self.resolve_file(&file) {
                Some(key) => self.forward(ClientEvent::DeleteFile { key }),
                None => vec![AppEvent::error(format!("No shared file named {file}"))],
            },
            AppAction::Kick { user } => self.forward(ClientEvent::KickUser { target: user }),
            AppAction::AssignRole { user, role } => {
                self.forward(ClientEvent::AssignRole { target: user, role })
            },
            AppAction::Export => self.forward(ClientEvent::ExportTranscript),
            AppAction::Render | AppAction::Quit | AppAction::Persist(_) => vec![],
        }
    }

    /// Handle an I/O outcome or inbound frame.
    pub fn handle_client_event(&mut self, event: ClientEvent<E::Instant>) -> Vec<AppEvent> {
        let room_info = matches!(event, ClientEvent::FrameReceived(ServerFrame::RoomInfo(_)));
        let mut events = self.forward(event);

        if room_info
            && let Some(meta) = self.client.as_ref().and_then(|c| c.session().metadata())
        {
            events.push(AppEvent::RoomInfo {
                is_persistent: meta.is_persistent,
                persistence_days: meta.persistence_days,
            });
        }
        events
    }

    /// Process a time tick.
    pub fn handle_tick(&mut self, now: E::Instant) -> Vec<AppEvent> {
        if self.client.is_none() {
            return vec![];
        }
        self.forward(ClientEvent::Tick { now })
    }

    /// Close the channel without leaving the room, for application exit.
    pub fn shutdown(&mut self) {
        if let Some(client) = self.client.as_mut()
            && !client.has_ended()
        {
            let result = client.handle(ClientEvent::Disconnect);
            let _ = self.handle_client_result(result);
        }
        self.client = None;
    }

    fn join(&mut self, identity: Identity, room_code: RoomCode) -> Vec<AppEvent> {
        if self.client.take().is_some() {
            tracing::warn!("joining while a session is active; closing the old channel");
            self.io.push(IoRequest::CloseChannel);
        }
        self.client = Some(Client::new(self.env.clone(), identity, room_code, self.config.clone()));
        self.forward(ClientEvent::Connect)
    }

    fn forward(&mut self, event: ClientEvent<E::Instant>) -> Vec<AppEvent> {
        let Some(client) = self.client.as_mut() else {
            tracing::debug!(?event, "no active session; dropping event");
            return match event {
                ClientEvent::Tick { .. }
                | ClientEvent::ChannelClosed(_)
                | ClientEvent::ChannelOpened
                | ClientEvent::ConnectFailed(_)
                | ClientEvent::FrameReceived(_)
                | ClientEvent::ProbeCompleted { .. }
                | ClientEvent::NetworkInfoReceived(_)
                | ClientEvent::UploadProgress { .. }
                | ClientEvent::UploadCompleted { .. }
                | ClientEvent::UploadFailed { .. } => vec![],
                _ => vec![AppEvent::error(ClientError::SessionEnded.to_string())],
            };
        };

        let is_tick = matches!(event, ClientEvent::Tick { .. });
        let typing_before = client.conversation().typing().len();
        let result = client.handle(event);
        let changed = !is_tick
            || client.conversation().typing().len() != typing_before
            || result.as_ref().is_ok_and(|actions| !actions.is_empty());

        let mut events = self.handle_client_result(result);
        if changed && self.client.is_some() {
            events.push(AppEvent::SessionUpdated);
        }
        events
    }

    /// Most recent shared file whose key or name matches `file`.
    fn resolve_file(&self, file: &str) -> Option<String> {
        let client = self.client.as_ref()?;
        let is_match = |m: &&MessageRecord| {
            m.kind == MessageKind::File
                && m.file.as_ref().is_some_and(|f| f.key == file || f.name == file)
        };
        client
            .conversation()
            .messages()
            .iter()
            .rev()
            .find(is_match)
            .and_then(|m| m.file.as_ref())
            .map(|f| f.key.clone())
    }

    fn handle_client_result(
        &mut self,
        result: Result<Vec<ClientAction>, ClientError>,
    ) -> Vec<AppEvent> {
        match result {
            Ok(actions) => self.process_client_actions(actions),
            Err(e) => vec![AppEvent::error(e.to_string())],
        }
    }

    fn process_client_actions(&mut self, actions: Vec<ClientAction>) -> Vec<AppEvent> {
        let mut events = Vec::new();

        for action in actions {
            match action {
                ClientAction::Send(frame) => self.io.push(IoRequest::Send(frame)),
                ClientAction::ProbeHealth { probe_id } => {
                    self.io.push(IoRequest::ProbeHealth { probe_id });
                },
                ClientAction::OpenChannel { attempt } => {
                    self.io.push(IoRequest::OpenChannel { attempt });
                },
                ClientAction::CloseChannel => self.io.push(IoRequest::CloseChannel),
                ClientAction::FetchNetworkInfo => self.io.push(IoRequest::FetchNetworkInfo),
                ClientAction::StartUpload { upload, source, presigned_url, content_type } => {
                    self.io.push(IoRequest::StartUpload {
                        upload,
                        source,
                        presigned_url,
                        content_type,
                    });
                },
                ClientAction::DownloadReady { key, filename, url } => {
                    tracing::debug!(%key, "download ready");
                    self.io.push(IoRequest::Download { filename, url });
                },
                ClientAction::Export(request) => self.io.push(IoRequest::Export(request)),
                ClientAction::StatusChanged { from, to } => {
                    events.push(AppEvent::StatusChanged { from, to });
                },
                ClientAction::RoleChanged(role) => events.push(AppEvent::RoleChanged(role)),
                ClientAction::Notify { level, message } => {
                    events.push(AppEvent::Notify { level, message });
                },
                ClientAction::SessionEnded(reason) => {
                    self.client = None;
                    events.push(AppEvent::SessionEnded(reason));
                },
            }
        }

        events
    }
}
