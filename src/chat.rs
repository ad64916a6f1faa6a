use crate::entity::{Participant, Sender};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive upper bound for a single message attachment.
pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

/// Session lifecycle. Declaration order is the transition order, so the
/// derived `Ord` expresses "status never moves backwards".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Initialized,
    Waiting,
    Active,
    Closed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Closed)
    }
}

/// A stored attachment as the server describes it: name plus storage path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub path: String,
}

/// An attachment about to be uploaded. Validated client-side before any
/// request goes out; the server accepts arbitrary media types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl AttachmentUpload {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_oversized(&self) -> bool {
        self.bytes.len() > MAX_ATTACHMENT_BYTES
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    pub timestamp: DateTime<Utc>,
}

/// One conversation between an end user and support, exactly as the server
/// last reported it. The server owns message ordering; the client never
/// reorders or deduplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub status: SessionStatus,
    pub participant: Participant,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub started_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }
}
