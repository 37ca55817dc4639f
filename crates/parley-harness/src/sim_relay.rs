//! In-memory model of the room relay.
//!
//! `SimRelay` is a sans-IO reference server: connections are plain ids,
//! inbound frames are handed to [`SimRelay::receive`], and outbound frames
//! queue per connection until the test drains them. It implements just
//! enough of the relay's behavior to drive clients end to end: history on
//! join, presence, typing fan-out, upload and download slots, file deletion,
//! and moderation.

use std::collections::{BTreeMap, VecDeque};

use parley_proto::{
    AssignRole, ClientFrame, DownloadUrl, ErrorNotice, FileAttachment, FileDeleted, FileRef,
    FileUploaded, JoinRoom, KickUser, MessageRecord, Role, RoleAssigned, RoomInfo, ServerFrame,
    UploadRequest, UploadSlot, UserKicked,
};

/// Relay-side connection id.
pub type ConnId = u64;

/// Settings applied to rooms the relay creates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayConfig {
    /// New rooms keep history after the last participant leaves
    pub persistent: bool,
    /// Retention reported for persistent rooms
    pub persistence_days: Option<u32>,
}

/// One room's server-side state.
#[derive(Debug, Clone, Default)]
pub struct RelayRoom {
    messages: Vec<MessageRecord>,
    members: Vec<(ConnId, String)>,
    roles: BTreeMap<String, Role>,
    uploaders: BTreeMap<String, String>,
    created_by: String,
    is_persistent: bool,
    persistence_days: Option<u32>,
}

impl RelayRoom {
    /// Ordered history.
    pub fn messages(&self) -> &[MessageRecord] {
        &self.messages
    }

    /// Connected display names, in join order, without duplicates.
    pub fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = Vec::new();
        for (_, name) in &self.members {
            if !users.contains(name) {
                users.push(name.clone());
            }
        }
        users
    }

    /// Role the relay holds for `name`.
    pub fn role_of(&self, name: &str) -> Role {
        self.roles.get(name).copied().unwrap_or_default()
    }

    fn conns_of(&self, name: &str) -> Vec<ConnId> {
        self.members.iter().filter(|(_, n)| n == name).map(|(c, _)| *c).collect()
    }
}

#[derive(Debug, Default)]
struct RelayConn {
    joined: Option<(String, String)>,
    outbox: VecDeque<ServerFrame>,
    closed_by_server: bool,
}

/// In-memory relay model.
#[derive(Debug, Default)]
pub struct SimRelay {
    config: RelayConfig,
    rooms: BTreeMap<String, RelayRoom>,
    conns: BTreeMap<ConnId, RelayConn>,
    next_conn: ConnId,
    next_message: u64,
    next_upload: u64,
    clock_ms: u64,
    received: Vec<(ConnId, ClientFrame)>,
}

impl SimRelay {
    /// Relay creating non-persistent rooms.
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    /// Relay with explicit room settings.
    pub fn with_config(config: RelayConfig) -> Self {
        Self { config, next_conn: 1, next_message: 1, clock_ms: 1_700_000_000_000, ..Self::default() }
    }

    /// Accept a channel.
    pub fn connect(&mut self) -> ConnId {
        let id = self.next_conn;
        self.next_conn += 1;
        self.conns.insert(id, RelayConn::default());
        tracing::debug!(conn = id, "relay accepted channel");
        id
    }

    /// Channel dropped by the client or the network.
    pub fn disconnect(&mut self, conn: ConnId) {
        self.depart(conn);
        self.conns.remove(&conn);
    }

    /// Close a channel from the server side, as a forced disconnect.
    pub fn force_close(&mut self, conn: ConnId) {
        self.depart(conn);
        if let Some(c) = self.conns.get_mut(&conn) {
            c.closed_by_server = true;
        }
    }

    /// Whether the server closed `conn`. Pending frames can still be drained.
    pub fn is_closed_by_server(&self, conn: ConnId) -> bool {
        self.conns.get(&conn).is_some_and(|c| c.closed_by_server)
    }

    /// Take frames queued for `conn`.
    pub fn drain(&mut self, conn: ConnId) -> Vec<ServerFrame> {
        self.conns.get_mut(&conn).map(|c| c.outbox.drain(..).collect()).unwrap_or_default()
    }

    /// Forget a server-closed connection once its frames were delivered.
    pub fn reap(&mut self, conn: ConnId) {
        if self.is_closed_by_server(conn) {
            self.conns.remove(&conn);
        }
    }

    /// Room state, if the room exists.
    pub fn room(&self, code: &str) -> Option<&RelayRoom> {
        self.rooms.get(code)
    }

    /// Every frame the relay has received, in order.
    pub fn received(&self) -> &[(ConnId, ClientFrame)] {
        &self.received
    }

    /// Handle one inbound frame.
    pub fn receive(&mut self, conn: ConnId, frame: ClientFrame) {
        if !self.conns.get(&conn).is_some_and(|c| !c.closed_by_server) {
            tracing::warn!(conn, event = frame.name(), "frame on closed channel dropped");
            return;
        }
        self.received.push((conn, frame.clone()));
        self.clock_ms += 1;

        if let ClientFrame::JoinRoom(join) = frame {
            self.join(conn, join);
            return;
        }

        let Some((room, name)) = self.conns.get(&conn).and_then(|c| c.joined.clone()) else {
            self.reject(conn, "Join a room first");
            return;
        };

        match frame {
            ClientFrame::JoinRoom(_) => {},
            ClientFrame::SendMessage(text) => {
                let id = self.next_id();
                let message = MessageRecord::user(id, name, text, self.clock_ms);
                self.append(&room, message);
            },
            ClientFrame::TypingStart => {
                self.broadcast_except(&room, conn, &ServerFrame::UserTyping(name));
            },
            ClientFrame::TypingStop => {
                self.broadcast_except(&room, conn, &ServerFrame::UserStoppedTyping(name));
            },
            ClientFrame::LeaveRoom => self.depart(conn),
            ClientFrame::RequestUploadUrl(request) => self.issue_upload_slot(conn, request),
            ClientFrame::FileUploaded(uploaded) => self.file_uploaded(conn, &room, name, uploaded),
            ClientFrame::DeleteFile(file) => self.delete_file(conn, &room, &name, file),
            ClientFrame::RequestDownloadUrl(FileRef { key }) => {
                let known = self.rooms.get(&room).is_some_and(|r| r.uploaders.contains_key(&key));
                if known {
                    let download_url = format!("sim://get/{key}");
                    self.send(conn, ServerFrame::DownloadUrl(DownloadUrl { key, download_url }));
                } else {
                    self.reject(conn, &format!("Unknown file {key}"));
                }
            },
            ClientFrame::KickUser(kick) => self.kick(conn, &room, &name, kick),
            ClientFrame::AssignRole(assign) => self.assign_role(conn, &room, &name, assign),
        }
    }

    fn join(&mut self, conn: ConnId, join: JoinRoom) {
        let JoinRoom { username, room_code } = join;
        if self.conns.get(&conn).is_some_and(|c| c.joined.is_some()) {
            self.depart(conn);
        }

        let config = self.config.clone();
        let room = self.rooms.entry(room_code.clone()).or_insert_with(|| RelayRoom {
            created_by: username.clone(),
            is_persistent: config.persistent,
            persistence_days: config.persistence_days.filter(|_| config.persistent),
            ..RelayRoom::default()
        });
        if room.roles.is_empty() {
            room.roles.insert(username.clone(), Role::Leader);
        }
        room.roles.entry(username.clone()).or_default();
        room.members.push((conn, username.clone()));

        let history = room.messages.clone();
        let info = RoomInfo {
            user_role: room.role_of(&username),
            is_persistent: room.is_persistent,
            persistence_days: room.persistence_days,
            created_by: Some(room.created_by.clone()),
            connection_id: Some(connection_id(conn)),
        };
        if let Some(c) = self.conns.get_mut(&conn) {
            c.joined = Some((room_code.clone(), username.clone()));
        }
        tracing::debug!(conn, user = %username, room = %room_code, "joined");

        self.send(conn, ServerFrame::LoadMessages(history));
        self.send(conn, ServerFrame::RoomInfo(info));
        self.announce(&room_code, format!("{username} joined the room"));
        self.broadcast_users(&room_code);
    }

    /// Remove `conn` from its room, if any.
    fn depart(&mut self, conn: ConnId) {
        let Some((room_code, name)) = self.conns.get_mut(&conn).and_then(|c| c.joined.take())
        else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&room_code) else {
            return;
        };
        room.members.retain(|(c, _)| *c != conn);
        let still_present = room.members.iter().any(|(_, n)| *n == name);

        if room.members.is_empty() && !room.is_persistent {
            tracing::debug!(room = %room_code, "last participant left; dropping room");
            self.rooms.remove(&room_code);
            return;
        }
        if !still_present {
            self.announce(&room_code, format!("{name} left the room"));
            self.broadcast_except(&room_code, conn, &ServerFrame::UserStoppedTyping(name));
        }
        self.broadcast_users(&room_code);
    }

    fn issue_upload_slot(&mut self, conn: ConnId, request: UploadRequest) {
        let key = format!("uploads/{}-{}", self.next_upload, request.filename);
        self.next_upload += 1;
        let slot = UploadSlot {
            presigned_url: format!("sim://put/{key}"),
            file_url: format!("sim://files/{key}"),
            key,
            filename: Some(request.filename),
        };
        self.send(conn, ServerFrame::UploadUrl(slot));
    }

    fn file_uploaded(&mut self, conn: ConnId, room: &str, name: String, uploaded: FileUploaded) {
        if let Some(r) = self.rooms.get_mut(room) {
            r.uploaders.insert(uploaded.key.clone(), name.clone());
        }
        let id = self.next_id();
        let attachment = FileAttachment {
            key: uploaded.key,
            name: uploaded.filename,
            size: uploaded.size,
            uploader_id: Some(connection_id(conn)),
            content_type: Some(uploaded.content_type),
        };
        let message = MessageRecord::file(id, name, attachment, self.clock_ms);
        self.append(room, message);
    }

    fn delete_file(&mut self, conn: ConnId, room: &str, name: &str, FileRef { key }: FileRef) {
        let Some(r) = self.rooms.get_mut(room) else {
            return;
        };
        match r.uploaders.get(&key).cloned() {
            Some(uploader) if uploader == name => {
                r.uploaders.remove(&key);
                r.messages.retain(|m| m.file_key() != Some(key.as_str()));
                self.broadcast(room, &ServerFrame::FileDeleted(FileDeleted { key }));
            },
            Some(_) => self.reject(conn, "Only the uploader can delete this file"),
            None => self.reject(conn, &format!("Unknown file {key}")),
        }
    }

    fn kick(&mut self, conn: ConnId, room: &str, name: &str, kick: KickUser) {
        let Some(r) = self.rooms.get(room) else {
            return;
        };
        let target = kick.target_username;
        let actor_role = r.role_of(name);
        if actor_role < Role::CoLeader || r.role_of(&target) >= actor_role {
            self.reject(conn, "You do not have permission to remove this user");
            return;
        }
        let targets = r.conns_of(&target);
        if targets.is_empty() {
            self.reject(conn, &format!("{target} is not in the room"));
            return;
        }

        for target_conn in targets {
            self.send(target_conn, ServerFrame::Kicked(format!("You were removed from {room}")));
            self.force_close(target_conn);
        }
        self.broadcast(room, &ServerFrame::UserKicked(UserKicked { username: target }));
    }

    fn assign_role(&mut self, conn: ConnId, room: &str, name: &str, assign: AssignRole) {
        let Some(r) = self.rooms.get_mut(room) else {
            return;
        };
        let AssignRole { target_username, new_role } = assign;
        let actor_role = r.role_of(name);
        if actor_role < Role::CoLeader
            || target_username == name
            || r.role_of(&target_username) >= actor_role
        {
            self.reject(conn, "You do not have permission to change this role");
            return;
        }
        if new_role == Role::Leader && actor_role != Role::Leader {
            self.reject(conn, "Only the room leader can transfer leadership");
            return;
        }
        if !r.roles.contains_key(&target_username) {
            self.reject(conn, &format!("{target_username} is not in the room"));
            return;
        }
        r.roles.insert(target_username.clone(), new_role);
        let message = format!("{target_username} is now {new_role}");
        self.broadcast(
            room,
            &ServerFrame::RoleAssigned(RoleAssigned { target_username, new_role, message }),
        );
    }

    fn append(&mut self, room: &str, message: MessageRecord) {
        let Some(r) = self.rooms.get_mut(room) else {
            return;
        };
        r.messages.push(message.clone());
        self.broadcast(room, &ServerFrame::Message(message));
    }

    fn announce(&mut self, room: &str, text: String) {
        let id = self.next_id();
        let Some(r) = self.rooms.get_mut(room) else {
            return;
        };
        let message = MessageRecord::system(id, text, self.clock_ms);
        r.messages.push(message.clone());
        self.broadcast(room, &ServerFrame::SystemMessage(message));
    }

    fn broadcast_users(&mut self, room: &str) {
        if let Some(users) = self.rooms.get(room).map(RelayRoom::users) {
            self.broadcast(room, &ServerFrame::RoomUsers(users));
        }
    }

    fn broadcast(&mut self, room: &str, frame: &ServerFrame) {
        self.broadcast_except(room, 0, frame);
    }

    fn broadcast_except(&mut self, room: &str, except: ConnId, frame: &ServerFrame) {
        let targets: Vec<ConnId> = self
            .rooms
            .get(room)
            .map(|r| r.members.iter().map(|(c, _)| *c).filter(|c| *c != except).collect())
            .unwrap_or_default();
        for conn in targets {
            self.send(conn, frame.clone());
        }
    }

    fn send(&mut self, conn: ConnId, frame: ServerFrame) {
        if let Some(c) = self.conns.get_mut(&conn) {
            c.outbox.push_back(frame);
        }
    }

    fn reject(&mut self, conn: ConnId, message: &str) {
        self.send(conn, ServerFrame::Error(ErrorNotice { message: message.to_string(), code: None }));
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_message;
        self.next_message += 1;
        id
    }
}

/// Connection id as reported to clients.
pub fn connection_id(conn: ConnId) -> String {
    format!("conn-{conn}")
}
