//! Client state machine.
//!
//! The `Client` is the top-level state machine for one room visit. It owns
//! the connection lifecycle, the conversation reducer, the dispatcher, and
//! the transfer coordinator, and routes every event through them one at a
//! time.

use parley_core::{
    CloseReason, ConnectErrorKind, ConnectionAction, ConnectionConfig, ConnectionManager,
    ConnectionState, Environment, FailureReason, Identity, RoomCode,
};
use parley_proto::{
    AssignRole, ClientFrame, ExportRequest, FileRef, FileUploaded, JoinRoom, KickUser,
    MessageKind, MessageRecord, Role, RoleAssigned, ServerFrame,
};

use crate::{
    conversation::{Conversation, ConversationEvent},
    dispatcher::{DispatchConfig, Dispatcher},
    error::ClientError,
    event::{ClientAction, ClientEvent, NoticeLevel, SessionEndReason},
    permissions::Permissions,
    session::Session,
    transfer::{DownloadStep, TransferConfig, TransferCoordinator, UploadId},
};

/// Tunables for every component of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Connection lifecycle
    pub connection: ConnectionConfig,
    /// Outbound validation and typing
    pub dispatch: DispatchConfig,
    /// Upload limits
    pub transfer: TransferConfig,
}

/// Session state machine for one room visit.
pub struct Client<E: Environment> {
    env: E,
    session: Session,
    connection: ConnectionManager<E::Instant>,
    conversation: Conversation<E::Instant>,
    dispatcher: Dispatcher<E::Instant>,
    transfers: TransferCoordinator,
    /// Finished uploads waiting for a channel to be announced on
    unannounced: Vec<FileUploaded>,
    ended: bool,
}

impl<E: Environment> Client<E> {
    /// Create a client for `identity` visiting `room_code`. Nothing happens
    /// until [`ClientEvent::Connect`].
    pub fn new(env: E, identity: Identity, room_code: RoomCode, config: ClientConfig) -> Self {
        Self {
            env,
            session: Session::new(identity, room_code),
            connection: ConnectionManager::new(config.connection),
            conversation: Conversation::new(),
            dispatcher: Dispatcher::new(config.dispatch),
            transfers: TransferCoordinator::new(config.transfer),
            unannounced: Vec::new(),
            ended: false,
        }
    }

    /// Session identity, room, role, and metadata.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Message log, presence, and typing state.
    pub fn conversation(&self) -> &Conversation<E::Instant> {
        &self.conversation
    }

    /// Connection lifecycle.
    pub fn connection(&self) -> &ConnectionManager<E::Instant> {
        &self.connection
    }

    /// Uploads and download cache.
    pub fn transfers(&self) -> &TransferCoordinator {
        &self.transfers
    }

    /// Current connectivity status.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Current local role.
    pub fn role(&self) -> Role {
        self.session.role()
    }

    /// Moderation capabilities of the current role.
    pub fn permissions(&self) -> Permissions {
        Permissions::for_role(self.session.role())
    }

    /// Whether a message was written by the local user.
    pub fn is_own(&self, message: &MessageRecord) -> bool {
        message.kind != MessageKind::System
            && message.username.as_deref() == Some(self.session.identity().as_str())
    }

    /// Whether the local user may delete the file carried by `message`.
    ///
    /// Uses the uploader's connection id when both sides know it, otherwise
    /// falls back to the author name.
    pub fn can_delete(&self, message: &MessageRecord) -> bool {
        let Some(file) = message.file.as_ref().filter(|_| message.kind == MessageKind::File)
        else {
            return false;
        };
        match (file.uploader_id.as_deref(), self.session.connection_id()) {
            (Some(uploader), Some(mine)) => uploader == mine,
            _ => self.is_own(message),
        }
    }

    /// Whether the session ended (left, kicked, or forced out).
    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Process an event and return resulting actions.
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if self.ended {
            return match event {
                ClientEvent::Tick { .. }
                | ClientEvent::ChannelClosed(_)
                | ClientEvent::ProbeCompleted { .. }
                | ClientEvent::FrameReceived(_) => Ok(Vec::new()),
                _ => Err(ClientError::SessionEnded),
            };
        }

        match event {
            ClientEvent::Connect => {
                let now = self.env.now();
                let actions = self.connection.connect(now)?;
                Ok(self.convert_connection_actions(actions))
            },
            ClientEvent::ProbeCompleted { probe_id, health } => {
                if let Some(ip) = health.as_ref().and_then(|h| h.ip.clone()) {
                    self.session.set_server_ip(ip);
                }
                let now = self.env.now();
                let actions = self.connection.probe_result(probe_id, health.is_some(), now);
                Ok(self.convert_connection_actions(actions))
            },
            ClientEvent::ChannelOpened => {
                let now = self.env.now();
                let first = !self.connection.ever_connected();
                let actions = self.connection.handle_open(now);
                let mut out = self.convert_connection_actions(actions);
                if first && self.connection.state() == ConnectionState::Connected {
                    out.push(ClientAction::FetchNetworkInfo);
                }
                Ok(out)
            },
            ClientEvent::ChannelClosed(reason) => {
                let now = self.env.now();
                let actions = self.connection.handle_closed(reason, now);
                Ok(self.convert_connection_actions(actions))
            },
            ClientEvent::ConnectFailed(kind) => {
                let now = self.env.now();
                let actions = self.connection.handle_connect_error(kind, now);
                Ok(self.convert_connection_actions(actions))
            },
            ClientEvent::FrameReceived(frame) => Ok(self.handle_frame(frame)),
            ClientEvent::NetworkInfoReceived(info) => {
                self.session.set_server_ip(info.ip);
                Ok(Vec::new())
            },
            ClientEvent::Tick { now } => Ok(self.handle_tick(now)),
            ClientEvent::SendMessage(text) => self.handle_send_message(&text),
            ClientEvent::Typing => {
                let now = self.env.now();
                Ok(self
                    .dispatcher
                    .keystroke(self.connection.state(), now)
                    .map(ClientAction::Send)
                    .into_iter()
                    .collect())
            },
            ClientEvent::LeaveRoom => Ok(self.handle_leave_room()),
            ClientEvent::Disconnect => {
                let now = self.env.now();
                self.dispatcher.reset();
                let actions = self.connection.disconnect(now);
                Ok(self.convert_connection_actions(actions))
            },
            ClientEvent::ManualReconnect => {
                let now = self.env.now();
                let actions = self.connection.manual_reconnect(now)?;
                Ok(self.convert_connection_actions(actions))
            },
            ClientEvent::UploadFile { source, filename, size } => {
                self.require_connected()?;
                let (_, frame) = self.transfers.request_upload(source, filename, size)?;
                Ok(frame.map(ClientAction::Send).into_iter().collect())
            },
            ClientEvent::UploadProgress { upload, sent, total } => {
                self.transfers.progress(upload, sent, total);
                Ok(Vec::new())
            },
            ClientEvent::UploadCompleted { upload } => self.handle_upload_completed(upload),
            ClientEvent::UploadFailed { upload, reason } => {
                let (task, next) = self.transfers.fail(upload)?;
                tracing::warn!(%upload, filename = %task.filename, %reason, "upload failed");
                let mut actions = vec![notify(
                    NoticeLevel::Error,
                    format!("Upload of {} failed: {reason}", task.filename),
                )];
                actions.extend(next.map(ClientAction::Send));
                Ok(actions)
            },
            ClientEvent::DownloadFile { key } => self.handle_download(&key),
            ClientEvent::DeleteFile { key } => self.handle_delete_file(key),
            ClientEvent::KickUser { target } => {
                self.require_connected()?;
                self.permissions().check_kick(self.session.identity(), &target)?;
                Ok(vec![ClientAction::Send(ClientFrame::KickUser(KickUser {
                    target_username: target,
                }))])
            },
            ClientEvent::AssignRole { target, role } => {
                self.require_connected()?;
                self.permissions().check_assign(self.session.identity(), &target, role)?;
                Ok(vec![ClientAction::Send(ClientFrame::AssignRole(AssignRole {
                    target_username: target,
                    new_role: role,
                }))])
            },
            ClientEvent::ExportTranscript => {
                let messages: Vec<MessageRecord> = self
                    .conversation
                    .messages()
                    .iter()
                    .filter(|m| m.kind != MessageKind::System)
                    .cloned()
                    .collect();
                Ok(vec![ClientAction::Export(ExportRequest {
                    room_code: self.session.room_code().to_string(),
                    messages,
                })])
            },
        }
    }

    fn handle_send_message(&mut self, text: &str) -> Result<Vec<ClientAction>, ClientError> {
        let frames = self.dispatcher.send_message(self.connection.state(), text)?;
        Ok(frames.into_iter().map(ClientAction::Send).collect())
    }

    fn handle_leave_room(&mut self) -> Vec<ClientAction> {
        let mut actions = Vec::new();

        if self.connection.state() == ConnectionState::Connected {
            if let Some(stop) = self.dispatcher.stop_typing() {
                actions.push(ClientAction::Send(stop));
            }
            actions.push(ClientAction::Send(ClientFrame::LeaveRoom));
        }
        self.dispatcher.reset();

        let now = self.env.now();
        let closing = self.connection.disconnect(now);
        actions.extend(self.convert_connection_actions(closing));
        if !actions.contains(&ClientAction::CloseChannel) {
            actions.push(ClientAction::CloseChannel);
        }

        tracing::info!(room = %self.session.room_code(), "left room");
        self.end(SessionEndReason::Left, &mut actions);
        actions
    }

    fn handle_upload_completed(&mut self, upload: UploadId) -> Result<Vec<ClientAction>, ClientError> {
        let (task, announce) = self.transfers.complete(upload)?;
        tracing::info!(%upload, filename = %task.filename, key = %announce.key, "upload completed");

        if self.connection.state() == ConnectionState::Connected {
            Ok(vec![ClientAction::Send(ClientFrame::FileUploaded(announce))])
        } else {
            self.unannounced.push(announce);
            Ok(Vec::new())
        }
    }

    fn handle_download(&mut self, key: &str) -> Result<Vec<ClientAction>, ClientError> {
        let filename = self
            .conversation
            .file_message(key)
            .and_then(|m| m.file.as_ref())
            .map(|f| f.name.clone())
            .ok_or_else(|| ClientError::UnknownFile { key: key.to_string() })?;

        if let Some(url) = self.transfers.location(key) {
            let url = url.to_string();
            return Ok(vec![ClientAction::DownloadReady { key: key.to_string(), filename, url }]);
        }

        self.require_connected()?;
        match self.transfers.request_download(key) {
            DownloadStep::Ready(url) => {
                Ok(vec![ClientAction::DownloadReady { key: key.to_string(), filename, url }])
            },
            DownloadStep::Request(frame) => Ok(vec![ClientAction::Send(frame)]),
            DownloadStep::Pending => Ok(Vec::new()),
        }
    }

    fn handle_delete_file(&mut self, key: String) -> Result<Vec<ClientAction>, ClientError> {
        self.require_connected()?;

        let message = self
            .conversation
            .file_message(&key)
            .ok_or_else(|| ClientError::UnknownFile { key: key.clone() })?;
        if !self.can_delete(message) {
            return Err(ClientError::NotUploader { key });
        }

        Ok(vec![ClientAction::Send(ClientFrame::DeleteFile(FileRef { key }))])
    }

    fn handle_frame(&mut self, frame: ServerFrame) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        let name = frame.name();

        match frame {
            ServerFrame::LoadMessages(batch) => {
                for key in batch.iter().filter_map(MessageRecord::file_key) {
                    if let Some(frame) = self.transfers.resolve(key) {
                        actions.push(ClientAction::Send(frame));
                    }
                }
                self.conversation.apply(ConversationEvent::HistoryLoaded(batch));
            },
            ServerFrame::Message(message) | ServerFrame::SystemMessage(message) => {
                let key = message.file_key().map(str::to_string);
                if self.conversation.apply(ConversationEvent::MessageReceived(message)) {
                    if let Some(frame) = key.and_then(|k| self.transfers.resolve(&k)) {
                        actions.push(ClientAction::Send(frame));
                    }
                }
            },
            ServerFrame::RoomUsers(users) => {
                self.conversation.apply(ConversationEvent::PresenceUpdated(users));
            },
            ServerFrame::RoomInfo(info) => {
                if let Some(role) = self.session.apply_room_info(info) {
                    actions.push(ClientAction::RoleChanged(role));
                }
            },
            ServerFrame::UserTyping(name) => {
                if !self.session.identity().is(&name) {
                    let at = self.env.now();
                    self.conversation.apply(ConversationEvent::TypingStarted { name, at });
                }
            },
            ServerFrame::UserStoppedTyping(name) => {
                self.conversation.apply(ConversationEvent::TypingStopped(name));
            },
            ServerFrame::FileDeleted(deleted) => {
                self.transfers.forget(&deleted.key);
                self.conversation.apply(ConversationEvent::FileDeleted(deleted.key));
            },
            ServerFrame::UploadUrl(slot) => match self.transfers.slot_received(slot) {
                Ok((task, next)) => {
                    if let Some(slot) = task.slot {
                        actions.push(ClientAction::StartUpload {
                            upload: task.id,
                            source: task.source,
                            presigned_url: slot.presigned_url,
                            content_type: task.content_type,
                        });
                    }
                    actions.extend(next.map(ClientAction::Send));
                },
                Err(e) => tracing::warn!(error = %e, "dropping upload slot"),
            },
            ServerFrame::DownloadUrl(resolved) => {
                let key = resolved.key.clone();
                if self.transfers.download_resolved(resolved.key, resolved.download_url.clone()) {
                    let filename = self
                        .conversation
                        .file_message(&key)
                        .and_then(|m| m.file.as_ref())
                        .map_or_else(|| key.clone(), |f| f.name.clone());
                    actions.push(ClientAction::DownloadReady {
                        key,
                        filename,
                        url: resolved.download_url,
                    });
                }
            },
            ServerFrame::UserKicked(kicked) => {
                if self.session.identity().is(&kicked.username) {
                    self.kicked(format!("You were removed from {}", self.session.room_code()), &mut actions);
                } else {
                    actions.push(notify(
                        NoticeLevel::Info,
                        format!("{} was removed from the room", kicked.username),
                    ));
                }
            },
            ServerFrame::RoleAssigned(assigned) => self.handle_role_assigned(assigned, &mut actions),
            ServerFrame::Kicked(message) => self.kicked(message, &mut actions),
            ServerFrame::Error(notice) => {
                tracing::warn!(message = %notice.message, code = ?notice.code, "server rejected action");
                actions.push(notify(NoticeLevel::Error, notice.message));
            },
        }

        tracing::trace!(event = name, "frame applied");
        actions
    }

    fn handle_role_assigned(&mut self, assigned: RoleAssigned, actions: &mut Vec<ClientAction>) {
        let is_me = self.session.identity().is(&assigned.target_username);
        if is_me && self.session.set_role(assigned.new_role) {
            actions.push(ClientAction::RoleChanged(assigned.new_role));
        }

        let message = if assigned.message.is_empty() {
            if is_me {
                format!("You are now {}", assigned.new_role)
            } else {
                format!("{} is now {}", assigned.target_username, assigned.new_role)
            }
        } else {
            assigned.message
        };
        actions.push(notify(NoticeLevel::Info, message));
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let mut actions = Vec::new();

        let connection = self.connection.tick(now);
        actions.extend(self.convert_connection_actions(connection));

        if let Some(stop) = self.dispatcher.tick(now) {
            if self.connection.state() == ConnectionState::Connected {
                actions.push(ClientAction::Send(stop));
            }
        }

        let ttl = self.dispatcher.config().typing_ttl;
        self.conversation.apply(ConversationEvent::ExpireTyping { now, ttl });

        actions
    }

    fn kicked(&mut self, message: String, actions: &mut Vec<ClientAction>) {
        tracing::info!(%message, "removed from room");
        self.dispatcher.reset();
        let now = self.env.now();
        let closing = self.connection.disconnect(now);
        actions.extend(self.convert_connection_actions(closing));
        self.end(SessionEndReason::Kicked { message }, actions);
    }

    fn end(&mut self, reason: SessionEndReason, actions: &mut Vec<ClientAction>) {
        if self.ended {
            return;
        }
        self.ended = true;
        actions.push(ClientAction::SessionEnded(reason));
    }

    fn require_connected(&self) -> Result<(), ClientError> {
        match self.connection.state() {
            ConnectionState::Connected => Ok(()),
            state => Err(ClientError::NotConnected { state }),
        }
    }

    fn channel_lost(&mut self, actions: &mut Vec<ClientAction>) {
        self.dispatcher.reset();
        self.conversation.apply(ConversationEvent::ChannelLost);
        for task in self.transfers.channel_lost() {
            tracing::warn!(id = %task.id, filename = %task.filename, "upload slot request lost");
            actions.push(notify(
                NoticeLevel::Error,
                format!("Upload of {} failed: connection lost", task.filename),
            ));
        }
    }

    fn convert_connection_actions(&mut self, actions: Vec<ConnectionAction>) -> Vec<ClientAction> {
        let mut out = Vec::with_capacity(actions.len());

        for action in actions {
            match action {
                ConnectionAction::ProbeHealth { probe_id } => {
                    out.push(ClientAction::ProbeHealth { probe_id });
                },
                ConnectionAction::Open { attempt } => out.push(ClientAction::OpenChannel { attempt }),
                ConnectionAction::Close => out.push(ClientAction::CloseChannel),
                ConnectionAction::AnnounceJoin => {
                    tracing::info!(
                        user = %self.session.identity(),
                        room = %self.session.room_code(),
                        "joining room"
                    );
                    out.push(ClientAction::Send(ClientFrame::JoinRoom(JoinRoom {
                        username: self.session.identity().to_string(),
                        room_code: self.session.room_code().to_string(),
                    })));
                    for announce in self.unannounced.drain(..) {
                        out.push(ClientAction::Send(ClientFrame::FileUploaded(announce)));
                    }
                },
                ConnectionAction::StatusChanged { from, to } => {
                    out.push(ClientAction::StatusChanged { from, to });
                    if from == ConnectionState::Connected {
                        self.channel_lost(&mut out);
                    }
                    if to == ConnectionState::Failed
                        && self.connection.failure() == Some(FailureReason::ServerForced)
                    {
                        self.end(SessionEndReason::ForcedDisconnect, &mut out);
                    }
                },
            }
        }

        out
    }
}

fn notify(level: NoticeLevel, message: String) -> ClientAction {
    ClientAction::Notify { level, message }
}

/// Classify a transport-level connect failure message for display.
pub fn classify_connect_error(detail: &str) -> ConnectErrorKind {
    let lower = detail.to_ascii_lowercase();
    if lower.contains("refused") || lower.contains("unreachable") || lower.contains("dns") {
        ConnectErrorKind::Refused
    } else if lower.contains("timed out") || lower.contains("timeout") {
        ConnectErrorKind::Timeout
    } else {
        ConnectErrorKind::Other
    }
}

/// Close reason for a channel that ended with `detail`.
pub fn close_reason(server_initiated: bool, detail: String) -> CloseReason {
    if server_initiated { CloseReason::ServerForced } else { CloseReason::Transport(detail) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    };

    use parley_proto::{DownloadUrl, FileAttachment, FileDeleted, RoomInfo, UploadSlot, UserKicked};

    use super::*;

    #[derive(Clone)]
    struct TestEnv {
        now: Arc<Mutex<Instant>>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self { now: Arc::new(Mutex::new(Instant::now())) }
        }

        fn advance(&self, d: Duration) -> Instant {
            let mut now = self.now.lock().unwrap();
            *now += d;
            *now
        }
    }

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = i as u8;
            }
        }
    }

    fn client(env: &TestEnv, name: &str) -> Client<TestEnv> {
        Client::new(
            env.clone(),
            Identity::parse(name).unwrap(),
            RoomCode::parse("abcd").unwrap(),
            ClientConfig::default(),
        )
    }

    fn connected(env: &TestEnv, name: &str) -> Client<TestEnv> {
        let mut c = client(env, name);
        c.handle(ClientEvent::Connect).unwrap();
        c.handle(ClientEvent::ProbeCompleted { probe_id: 1, health: None }).unwrap();
        c.handle(ClientEvent::ChannelOpened).unwrap();
        c
    }

    fn sent(actions: &[ClientAction]) -> Vec<&ClientFrame> {
        actions
            .iter()
            .filter_map(|a| match a {
                ClientAction::Send(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    fn file_message(id: u64, author: &str, key: &str, uploader: Option<&str>) -> MessageRecord {
        MessageRecord::file(
            id,
            author,
            FileAttachment {
                key: key.into(),
                name: format!("{key}.png"),
                size: 10,
                uploader_id: uploader.map(Into::into),
                content_type: None,
            },
            0,
        )
    }

    #[test]
    fn connect_announces_join_with_normalized_room() {
        let env = TestEnv::new();
        let mut c = client(&env, "alice");

        let actions = c.handle(ClientEvent::Connect).unwrap();
        assert!(actions.contains(&ClientAction::ProbeHealth { probe_id: 1 }));

        let actions = c.handle(ClientEvent::ProbeCompleted { probe_id: 1, health: None }).unwrap();
        assert!(actions.contains(&ClientAction::OpenChannel { attempt: 0 }));

        let actions = c.handle(ClientEvent::ChannelOpened).unwrap();
        assert_eq!(
            sent(&actions),
            vec![&ClientFrame::JoinRoom(JoinRoom { username: "alice".into(), room_code: "ABCD".into() })]
        );
        assert!(actions.contains(&ClientAction::FetchNetworkInfo));
    }

    #[test]
    fn send_rejected_while_reconnecting() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");
        c.handle(ClientEvent::ChannelClosed(CloseReason::Transport("drop".into()))).unwrap();

        let err = c.handle(ClientEvent::SendMessage("hi".into())).unwrap_err();
        assert!(matches!(err, ClientError::NotConnected { .. }));
    }

    #[test]
    fn self_role_assignment_updates_role_and_notifies() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");

        let actions = c
            .handle(ClientEvent::FrameReceived(ServerFrame::RoleAssigned(RoleAssigned {
                target_username: "alice".into(),
                new_role: Role::CoLeader,
                message: String::new(),
            })))
            .unwrap();

        assert_eq!(c.role(), Role::CoLeader);
        assert!(actions.contains(&ClientAction::RoleChanged(Role::CoLeader)));
        assert!(actions.iter().any(|a| matches!(a, ClientAction::Notify { .. })));

        // Others' role changes only notify
        let actions = c
            .handle(ClientEvent::FrameReceived(ServerFrame::RoleAssigned(RoleAssigned {
                target_username: "bob".into(),
                new_role: Role::Leader,
                message: "bob is now leader".into(),
            })))
            .unwrap();
        assert_eq!(c.role(), Role::CoLeader);
        assert_eq!(actions, vec![notify(NoticeLevel::Info, "bob is now leader".into())]);
    }

    #[test]
    fn kicked_ends_session_and_closes() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");

        let actions =
            c.handle(ClientEvent::FrameReceived(ServerFrame::Kicked("bye".into()))).unwrap();
        assert!(actions.contains(&ClientAction::CloseChannel));
        assert!(actions.contains(&ClientAction::SessionEnded(SessionEndReason::Kicked {
            message: "bye".into()
        })));
        assert!(c.has_ended());
        assert_eq!(c.handle(ClientEvent::SendMessage("x".into())), Err(ClientError::SessionEnded));
    }

    #[test]
    fn user_kicked_self_ends_session() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");
        let actions = c
            .handle(ClientEvent::FrameReceived(ServerFrame::UserKicked(UserKicked {
                username: "alice".into(),
            })))
            .unwrap();
        assert!(actions.iter().any(|a| matches!(a, ClientAction::SessionEnded(_))));
    }

    #[test]
    fn forced_disconnect_ends_session() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");
        let actions = c.handle(ClientEvent::ChannelClosed(CloseReason::ServerForced)).unwrap();
        assert!(actions.contains(&ClientAction::SessionEnded(SessionEndReason::ForcedDisconnect)));
        assert_eq!(c.state(), ConnectionState::Failed);
    }

    #[test]
    fn leave_announces_before_closing() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");
        c.handle(ClientEvent::Typing).unwrap();

        let actions = c.handle(ClientEvent::LeaveRoom).unwrap();
        let leave = actions.iter().position(|a| *a == ClientAction::Send(ClientFrame::LeaveRoom));
        let close = actions.iter().position(|a| *a == ClientAction::CloseChannel);
        assert!(leave.unwrap() < close.unwrap());
        assert_eq!(actions[0], ClientAction::Send(ClientFrame::TypingStop));
        assert_eq!(actions.last(), Some(&ClientAction::SessionEnded(SessionEndReason::Left)));
    }

    #[test]
    fn typing_stop_after_debounce() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");
        let actions = c.handle(ClientEvent::Typing).unwrap();
        assert_eq!(sent(&actions), vec![&ClientFrame::TypingStart]);

        let now = env.advance(Duration::from_millis(1000));
        let actions = c.handle(ClientEvent::Tick { now }).unwrap();
        assert_eq!(sent(&actions), vec![&ClientFrame::TypingStop]);
    }

    #[test]
    fn own_typing_echo_is_ignored() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");
        c.handle(ClientEvent::FrameReceived(ServerFrame::UserTyping("alice".into()))).unwrap();
        c.handle(ClientEvent::FrameReceived(ServerFrame::UserTyping("bob".into()))).unwrap();
        assert_eq!(c.conversation().typing().names().collect::<Vec<_>>(), vec!["bob"]);
    }

    #[test]
    fn file_messages_trigger_single_resolution() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");
        let m = file_message(1, "bob", "k1", None);

        let actions = c
            .handle(ClientEvent::FrameReceived(ServerFrame::LoadMessages(vec![m.clone()])))
            .unwrap();
        assert_eq!(
            sent(&actions),
            vec![&ClientFrame::RequestDownloadUrl(FileRef { key: "k1".into() })]
        );

        // Asking to open while resolution is in flight sends nothing new
        let actions = c.handle(ClientEvent::DownloadFile { key: "k1".into() }).unwrap();
        assert!(actions.is_empty());

        let actions = c
            .handle(ClientEvent::FrameReceived(ServerFrame::DownloadUrl(DownloadUrl {
                key: "k1".into(),
                download_url: "https://dl/k1".into(),
            })))
            .unwrap();
        assert_eq!(actions, vec![ClientAction::DownloadReady {
            key: "k1".into(),
            filename: "k1.png".into(),
            url: "https://dl/k1".into(),
        }]);
    }

    #[test]
    fn only_uploader_may_delete() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");
        c.handle(ClientEvent::FrameReceived(ServerFrame::RoomInfo(RoomInfo {
            user_role: Role::Member,
            is_persistent: false,
            persistence_days: None,
            created_by: None,
            connection_id: Some("c-alice".into()),
        })))
        .unwrap();
        c.handle(ClientEvent::FrameReceived(ServerFrame::LoadMessages(vec![
            file_message(1, "alice", "mine", Some("c-alice")),
            file_message(2, "bob", "theirs", Some("c-bob")),
            // Same author name from an earlier connection: id wins
            file_message(3, "alice", "stale", Some("c-old")),
        ])))
        .unwrap();

        let actions = c.handle(ClientEvent::DeleteFile { key: "mine".into() }).unwrap();
        assert_eq!(sent(&actions), vec![&ClientFrame::DeleteFile(FileRef { key: "mine".into() })]);

        for key in ["theirs", "stale"] {
            assert_eq!(
                c.handle(ClientEvent::DeleteFile { key: key.into() }),
                Err(ClientError::NotUploader { key: key.into() })
            );
        }
    }

    #[test]
    fn deletion_event_removes_message_and_cache() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");
        c.handle(ClientEvent::FrameReceived(ServerFrame::LoadMessages(vec![file_message(
            1, "bob", "k1", None,
        )])))
        .unwrap();
        c.handle(ClientEvent::FrameReceived(ServerFrame::DownloadUrl(DownloadUrl {
            key: "k1".into(),
            download_url: "u".into(),
        })))
        .unwrap();

        c.handle(ClientEvent::FrameReceived(ServerFrame::FileDeleted(FileDeleted {
            key: "k1".into(),
        })))
        .unwrap();
        assert!(c.conversation().messages().is_empty());
        assert_eq!(c.transfers().location("k1"), None);
    }

    #[test]
    fn upload_flow_announces_file() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");

        let actions = c
            .handle(ClientEvent::UploadFile {
                source: "/tmp/a.png".into(),
                filename: "a.png".into(),
                size: 4,
            })
            .unwrap();
        assert!(matches!(sent(&actions).as_slice(), [ClientFrame::RequestUploadUrl(_)]));

        let actions = c
            .handle(ClientEvent::FrameReceived(ServerFrame::UploadUrl(UploadSlot {
                presigned_url: "https://put".into(),
                file_url: "https://get".into(),
                key: "uploads/a.png".into(),
                filename: None,
            })))
            .unwrap();
        let [ClientAction::StartUpload { upload, source, .. }] = actions.as_slice() else {
            unreachable!("expected StartUpload");
        };
        assert_eq!(source, "/tmp/a.png");

        let actions = c.handle(ClientEvent::UploadCompleted { upload: *upload }).unwrap();
        let frames = sent(&actions);
        let [ClientFrame::FileUploaded(announce)] = frames.as_slice() else {
            unreachable!("expected FileUploaded");
        };
        assert_eq!(announce.key, "uploads/a.png");
        assert!(c.transfers().uploads().is_empty());
    }

    #[test]
    fn queued_upload_requests_its_slot_after_the_first_binds() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");

        let upload = |c: &mut Client<TestEnv>, name: &str| {
            c.handle(ClientEvent::UploadFile {
                source: format!("/tmp/{name}"),
                filename: name.into(),
                size: 4,
            })
            .unwrap()
        };
        assert_eq!(sent(&upload(&mut c, "a.png")).len(), 1);
        assert!(sent(&upload(&mut c, "b.pdf")).is_empty());

        let opaque = |key: &str| {
            ServerFrame::UploadUrl(UploadSlot {
                presigned_url: format!("https://s3/put/{key}"),
                file_url: format!("https://s3/{key}"),
                key: key.into(),
                filename: None,
            })
        };
        let actions = c.handle(ClientEvent::FrameReceived(opaque("uploads/7d1a"))).unwrap();
        let [ClientAction::StartUpload { source, .. }, ClientAction::Send(ClientFrame::RequestUploadUrl(next))] =
            actions.as_slice()
        else {
            unreachable!("expected StartUpload then the next slot request");
        };
        assert_eq!(source, "/tmp/a.png");
        assert_eq!(next.filename, "b.pdf");

        let actions = c.handle(ClientEvent::FrameReceived(opaque("uploads/0f9c2e"))).unwrap();
        let [ClientAction::StartUpload { source, presigned_url, .. }] = actions.as_slice() else {
            unreachable!("expected StartUpload");
        };
        assert_eq!(source, "/tmp/b.pdf");
        assert_eq!(presigned_url, "https://s3/put/uploads/0f9c2e");
    }

    #[test]
    fn upload_finished_offline_is_announced_after_rejoin() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");
        c.handle(ClientEvent::UploadFile { source: "s".into(), filename: "a.png".into(), size: 1 })
            .unwrap();
        c.handle(ClientEvent::FrameReceived(ServerFrame::UploadUrl(UploadSlot {
            presigned_url: "p".into(),
            file_url: "f".into(),
            key: "k".into(),
            filename: Some("a.png".into()),
        })))
        .unwrap();

        c.handle(ClientEvent::ChannelClosed(CloseReason::Transport("drop".into()))).unwrap();
        let upload = c.transfers().uploads()[0].id;
        assert!(c.handle(ClientEvent::UploadCompleted { upload }).unwrap().is_empty());

        let now = env.advance(Duration::from_secs(1));
        c.handle(ClientEvent::Tick { now }).unwrap();
        let actions = c.handle(ClientEvent::ChannelOpened).unwrap();
        let frames = sent(&actions);
        assert!(matches!(frames[0], ClientFrame::JoinRoom(_)));
        assert!(matches!(frames[1], ClientFrame::FileUploaded(_)));
    }

    #[test]
    fn export_excludes_system_messages() {
        let env = TestEnv::new();
        let mut c = connected(&env, "alice");
        c.handle(ClientEvent::FrameReceived(ServerFrame::LoadMessages(vec![
            MessageRecord::system(1, "bob joined", 0),
            MessageRecord::user(2, "bob", "hello", 1),
        ])))
        .unwrap();

        let actions = c.handle(ClientEvent::ExportTranscript).unwrap();
        let [ClientAction::Export(request)] = actions.as_slice() else {
            unreachable!("expected Export");
        };
        assert_eq!(request.room_code, "ABCD");
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn connect_errors_are_classified() {
        assert_eq!(classify_connect_error("Connection refused (os error 111)"), ConnectErrorKind::Refused);
        assert_eq!(classify_connect_error("operation timed out"), ConnectErrorKind::Timeout);
        assert_eq!(classify_connect_error("tls handshake eof"), ConnectErrorKind::Other);
    }
}
