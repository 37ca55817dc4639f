//! Named channel events.
//!
//! [`ClientFrame`] covers everything the client emits, [`ServerFrame`]
//! everything the relay sends back. Both encode as a JSON object with an
//! `event` tag and an optional `data` payload.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    errors::{ProtocolError, Result},
    message::MessageRecord,
    role::Role,
};

/// Join announcement, sent after every successful channel open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    /// Local display identity.
    pub username: String,
    /// Normalized room code.
    pub room_code: String,
}

/// Request for a time-limited upload destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// Original file name.
    pub filename: String,
    /// Detected MIME type.
    pub content_type: String,
}

/// Announcement of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploaded {
    /// Public read location of the stored object.
    pub file_url: String,
    /// Original file name.
    pub filename: String,
    /// Storage key.
    pub key: String,
    /// Lowercase file extension without the dot.
    pub extension: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type declared when the slot was requested.
    pub content_type: String,
}

/// Reference to a stored file by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Storage key.
    pub key: String,
}

/// Moderation: remove a participant from the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickUser {
    /// Display name of the participant to remove.
    pub target_username: String,
}

/// Moderation: change a participant's role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRole {
    /// Display name of the participant.
    pub target_username: String,
    /// Role to assign.
    pub new_role: Role,
}

/// Events emitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Announce membership in a room.
    JoinRoom(JoinRoom),
    /// Post a text message.
    SendMessage(String),
    /// Local user started typing.
    TypingStart,
    /// Local user stopped typing.
    TypingStop,
    /// Explicit departure before closing the channel.
    LeaveRoom,
    /// Ask for an upload slot.
    RequestUploadUrl(UploadRequest),
    /// Announce a finished upload.
    FileUploaded(FileUploaded),
    /// Delete an uploaded file.
    DeleteFile(FileRef),
    /// Resolve a download location.
    RequestDownloadUrl(FileRef),
    /// Remove a participant.
    KickUser(KickUser),
    /// Change a participant's role.
    AssignRole(AssignRole),
}

impl ClientFrame {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "joinRoom",
            Self::SendMessage(_) => "sendMessage",
            Self::TypingStart => "typingStart",
            Self::TypingStop => "typingStop",
            Self::LeaveRoom => "leaveRoom",
            Self::RequestUploadUrl(_) => "requestUploadUrl",
            Self::FileUploaded(_) => "fileUploaded",
            Self::DeleteFile(_) => "deleteFile",
            Self::RequestDownloadUrl(_) => "requestDownloadUrl",
            Self::KickUser(_) => "kickUser",
            Self::AssignRole(_) => "assignRole",
        }
    }

    /// Encode as a JSON text message.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode from a JSON text message.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// Room metadata and the receiver's role, sent once after join.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    /// Role of the receiving participant.
    #[serde(default)]
    pub user_role: Role,
    /// Whether the room's history outlives its last participant.
    #[serde(default)]
    pub is_persistent: bool,
    /// Retention period for persistent rooms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_days: Option<u32>,
    /// Display name of the room creator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Channel connection id assigned to the receiver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
}

/// A file was deleted; every message carrying this key must disappear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDeleted {
    /// Storage key.
    pub key: String,
}

/// Upload destination issued by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSlot {
    /// Temporary write target.
    pub presigned_url: String,
    /// Public read location once written.
    pub file_url: String,
    /// Storage key.
    pub key: String,
    /// Echo of the requested file name, when the server provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Resolved download location for a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrl {
    /// Storage key.
    pub key: String,
    /// Time-limited read location.
    pub download_url: String,
}

/// Broadcast that a participant was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserKicked {
    /// Display name of the removed participant.
    pub username: String,
}

/// Broadcast of a role change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssigned {
    /// Participant whose role changed.
    pub target_username: String,
    /// Their new role.
    pub new_role: Role,
    /// Human-readable notice.
    #[serde(default)]
    pub message: String,
}

/// Server-side rejection of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    /// Human-readable cause.
    pub message: String,
    /// Optional machine-readable code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Events received from the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerFrame {
    /// Full ordered history of the room.
    LoadMessages(#[serde(deserialize_with = "null_as_empty")] Vec<MessageRecord>),
    /// New user or file message.
    Message(MessageRecord),
    /// New system notice.
    SystemMessage(MessageRecord),
    /// Current participants, replaces any previous list.
    RoomUsers(#[serde(deserialize_with = "null_as_empty")] Vec<String>),
    /// Room metadata and the receiver's role.
    RoomInfo(RoomInfo),
    /// A participant started typing.
    UserTyping(String),
    /// A participant stopped typing.
    UserStoppedTyping(String),
    /// A stored file was deleted.
    FileDeleted(FileDeleted),
    /// Upload destination.
    UploadUrl(UploadSlot),
    /// Download location.
    DownloadUrl(DownloadUrl),
    /// A participant was removed.
    UserKicked(UserKicked),
    /// A participant's role changed.
    RoleAssigned(RoleAssigned),
    /// The receiver was removed from the room.
    Kicked(String),
    /// An action was rejected.
    Error(ErrorNotice),
}

impl ServerFrame {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadMessages(_) => "loadMessages",
            Self::Message(_) => "message",
            Self::SystemMessage(_) => "systemMessage",
            Self::RoomUsers(_) => "roomUsers",
            Self::RoomInfo(_) => "roomInfo",
            Self::UserTyping(_) => "userTyping",
            Self::UserStoppedTyping(_) => "userStoppedTyping",
            Self::FileDeleted(_) => "fileDeleted",
            Self::UploadUrl(_) => "uploadUrl",
            Self::DownloadUrl(_) => "downloadUrl",
            Self::UserKicked(_) => "userKicked",
            Self::RoleAssigned(_) => "roleAssigned",
            Self::Kicked(_) => "kicked",
            Self::Error(_) => "error",
        }
    }

    /// Encode as a JSON text message.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode from a JSON text message.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
