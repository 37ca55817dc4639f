//! Conversation message records.
//!
//! A [`MessageRecord`] is immutable once received. `File` messages always
//! carry a structured [`FileAttachment`]; the storage key is never recovered
//! from rendered text.

use serde::{Deserialize, Serialize};

/// Server-assigned message identifier.
///
/// Servers emit either numeric or string ids; both normalize to a string so
/// ids compare consistently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawMessageId", into = "String")]
pub struct MessageId(String);

impl MessageId {
    /// Create an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMessageId {
    Number(u64),
    Text(String),
}

impl From<RawMessageId> for MessageId {
    fn from(raw: RawMessageId) -> Self {
        match raw {
            RawMessageId::Number(n) => Self(n.to_string()),
            RawMessageId::Text(s) => Self(s),
        }
    }
}

/// Kind of a message in the conversation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Text written by a participant.
    User,
    /// Server-generated notice (joins, leaves, role changes).
    System,
    /// Announced file attachment.
    File,
}

/// Structured descriptor of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    /// Storage-side key. Sole identifier for download and deletion.
    pub key: String,
    /// Original file name.
    pub name: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Channel connection id of the uploader, when the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader_id: Option<String>,
    /// MIME type declared at upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// A message in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique, server-assigned id.
    pub id: MessageId,
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Display name of the author. Absent for system messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Text body. For file messages, a human-readable caption.
    #[serde(default)]
    pub content: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    /// Attachment descriptor for `File` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttachment>,
}

impl MessageRecord {
    /// Build a user message.
    pub fn user(
        id: impl Into<MessageId>,
        username: impl Into<String>,
        content: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::User,
            username: Some(username.into()),
            content: content.into(),
            timestamp,
            file: None,
        }
    }

    /// Build a system message.
    pub fn system(id: impl Into<MessageId>, content: impl Into<String>, timestamp: u64) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::System,
            username: None,
            content: content.into(),
            timestamp,
            file: None,
        }
    }

    /// Build a file message.
    pub fn file(
        id: impl Into<MessageId>,
        username: impl Into<String>,
        attachment: FileAttachment,
        timestamp: u64,
    ) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::File,
            username: Some(username.into()),
            content: attachment.name.clone(),
            timestamp,
            file: Some(attachment),
        }
    }

    /// Storage key of the attachment. `None` unless this is a file message.
    pub fn file_key(&self) -> Option<&str> {
        match self.kind {
            MessageKind::File => self.file.as_ref().map(|f| f.key.as_str()),
            MessageKind::User | MessageKind::System => None,
        }
    }

    /// Whether the record is well-formed for its kind.
    ///
    /// File messages must carry an attachment; user and file messages must
    /// carry an author.
    pub fn is_well_formed(&self) -> bool {
        match self.kind {
            MessageKind::System => true,
            MessageKind::User => self.username.is_some(),
            MessageKind::File => self.username.is_some() && self.file.is_some(),
        }
    }
}
