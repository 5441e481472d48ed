use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix marking a locally generated message id that has not been confirmed
/// by the server. Confirmed ids never carry it.
pub const LOCAL_ID_PREFIX: &str = "local-";

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageDeliveryState {
    Pending,
    Sent,
    Failed { reason: String },
}

/// Pointer to an external entity a message references, e.g. the order a
/// buyer is asking support about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedReference {
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub preview: Option<String>,
}

/// Canonical message shape. Every origin (history fetch, push event, local
/// optimistic insert) is normalized into this before anything else sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(default)]
    pub sender_email: Option<String>,
    pub body: String,
    #[serde(default)]
    pub attached_reference: Option<AttachedReference>,
    /// User ids that have read this message. Grows monotonically.
    pub read_by: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivery: MessageDeliveryState,
}

impl ChatMessage {
    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub participants: Vec<Participant>,
    pub last_message_preview: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Unread count for the viewing user. Always 0 for the active conversation.
    pub unread_count: u32,
}

impl ConversationSummary {
    /// List sort key: most recent activity, falling back to the
    /// conversation's own update time.
    pub fn activity_ts(&self) -> i64 {
        self.last_activity_at
            .or(self.updated_at)
            .map(|t| t.timestamp_millis())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPeer {
    pub user_id: String,
    pub user_name: String,
}

/// View state for the currently open conversation. `messages` is always the
/// deduplicated, sorted timeline; no other code path appends to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationViewState {
    pub conversation_id: String,
    pub messages: Vec<ChatMessage>,
    pub typing: Vec<TypingPeer>,
    pub history_loaded: bool,
    /// Composer attachment staged for the next send.
    pub staged_attachment: Option<AttachedReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    pub rev: u64,
    pub connection: ConnectionState,
    pub user: Option<UserIdentity>,
    pub conversations: Vec<ConversationSummary>,
    pub active: Option<ConversationViewState>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            connection: ConnectionState::Disconnected,
            user: None,
            conversations: Vec::new(),
            active: None,
            toast: None,
        }
    }
}
