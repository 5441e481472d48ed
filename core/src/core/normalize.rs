//! The single normalization boundary. Wire payloads differ in field names
//! and shape depending on origin; everything downstream consumes the
//! canonical types from `state` only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{
    now, AttachedReference, ChatMessage, ConversationSummary, MessageDeliveryState, Participant,
    LOCAL_ID_PREFIX,
};

const FALLBACK_SENDER_NAME: &str = "Unknown";

/// Author reference as it appears on the wire: either a populated object or
/// a bare id when the backend did not join the user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSender {
    Populated {
        #[serde(alias = "_id")]
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        email: Option<String>,
    },
    Reference(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMessage {
    #[serde(alias = "_id")]
    pub id: Option<String>,
    #[serde(alias = "conversationId", alias = "conversation")]
    pub conversation_id: Option<String>,
    pub sender: Option<RawSender>,
    /// Primary text field.
    pub body: Option<String>,
    /// Legacy text field some origins still populate instead of `body`.
    pub text: Option<String>,
    #[serde(alias = "attachedReference")]
    pub attached_reference: Option<AttachedReference>,
    #[serde(alias = "readBy")]
    pub read_by: Option<Vec<String>>,
    #[serde(alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(alias = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawParticipant {
    #[serde(alias = "_id")]
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLastMessage {
    pub body: Option<String>,
    pub text: Option<String>,
    #[serde(alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConversation {
    #[serde(alias = "_id")]
    pub id: Option<String>,
    pub participants: Option<Vec<RawParticipant>>,
    #[serde(alias = "lastMessage")]
    pub last_message: Option<RawLastMessage>,
    /// Per-viewer count.
    #[serde(alias = "unreadCount")]
    pub unread_count: Option<i64>,
    /// Generic count some deployments send instead.
    pub unread: Option<i64>,
    #[serde(alias = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

/// Pure, total: always yields a well-formed message, degrading field by
/// field on missing data. `fallback_conversation_id` is used when the
/// payload omits its own (push events scope messages by room already).
pub fn normalize_message(raw: RawMessage, fallback_conversation_id: &str) -> ChatMessage {
    let (sender_id, sender_name, sender_email) = match raw.sender {
        Some(RawSender::Populated { id, name, email }) => (
            id,
            non_empty(name).unwrap_or_else(|| FALLBACK_SENDER_NAME.to_string()),
            email,
        ),
        Some(RawSender::Reference(id)) => (id, FALLBACK_SENDER_NAME.to_string(), None),
        None => (String::new(), FALLBACK_SENDER_NAME.to_string(), None),
    };

    // A payload without an id can never be merged with anything; give it a
    // local identity so it renders without corrupting dedup.
    let id = non_empty(raw.id)
        .unwrap_or_else(|| format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()));

    let created_at = raw.created_at.unwrap_or_else(now);
    let updated_at = raw.updated_at.unwrap_or(created_at);

    ChatMessage {
        id,
        conversation_id: non_empty(raw.conversation_id)
            .unwrap_or_else(|| fallback_conversation_id.to_string()),
        sender_id,
        sender_name,
        sender_email,
        body: non_empty(raw.body).or(non_empty(raw.text)).unwrap_or_default(),
        attached_reference: raw.attached_reference,
        read_by: raw.read_by.unwrap_or_default(),
        created_at,
        updated_at,
        delivery: MessageDeliveryState::Sent,
    }
}

/// Conversations without an id are unaddressable and dropped.
pub fn normalize_conversation(raw: RawConversation) -> Option<ConversationSummary> {
    let id = non_empty(raw.id)?;

    let participants = raw
        .participants
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| {
            Some(Participant {
                id: non_empty(p.id)?,
                name: non_empty(p.name).unwrap_or_else(|| FALLBACK_SENDER_NAME.to_string()),
            })
        })
        .collect();

    let (last_message_preview, last_activity_at) = match raw.last_message {
        Some(lm) => (non_empty(lm.body).or(non_empty(lm.text)), lm.created_at),
        None => (None, None),
    };

    // Whichever unread field is numeric wins; neither means 0.
    let unread_count = raw
        .unread_count
        .or(raw.unread)
        .map(|n| n.max(0) as u32)
        .unwrap_or(0);

    Some(ConversationSummary {
        id,
        participants,
        last_message_preview,
        last_activity_at,
        updated_at: raw.updated_at,
        unread_count,
    })
}
