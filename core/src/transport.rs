//! Real-time transport boundary.
//!
//! The engine assumes a reliable pub/sub primitive with per-connection event
//! subscription; the implementation (websocket, SSE, whatever) lives outside
//! this crate and is injected at construction time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::normalize::RawMessage;
use crate::state::AttachedReference;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport not connected")]
    NotConnected,
    #[error("transport send failed: {0}")]
    Send(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub conversation_id: String,
    pub body: String,
    #[serde(default)]
    pub attached_reference: Option<AttachedReference>,
}

/// Server push events. Message payloads arrive in wire shape and go through
/// the normalizer before anything else sees them.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    NewMessage {
        conversation_id: String,
        message: RawMessage,
    },
    Typing {
        conversation_id: String,
        user_id: String,
        user_name: String,
        is_typing: bool,
    },
    MessageRead {
        conversation_id: String,
        user_id: String,
    },
    ConversationUpdated {
        conversation_id: String,
        last_message: Option<String>,
        last_message_at: Option<DateTime<Utc>>,
    },
    /// The transport dropped and re-established its connection. Room
    /// membership is gone server side and must be re-established.
    Reconnected,
}

pub trait RealtimeTransport: Send + Sync + 'static {
    fn connect(&self) -> Result<(), TransportError>;
    fn disconnect(&self);

    /// Event subscription handle. Dropping the receiver is the unsubscribe
    /// disposer; the transport must stop delivering to dropped handles.
    fn subscribe(&self) -> flume::Receiver<ServerEvent>;

    fn join_room(&self, conversation_id: &str) -> Result<(), TransportError>;
    fn leave_room(&self, conversation_id: &str) -> Result<(), TransportError>;

    fn send_message(&self, message: OutboundMessage) -> Result<(), TransportError>;
    fn start_typing(&self, conversation_id: &str) -> Result<(), TransportError>;
    fn stop_typing(&self, conversation_id: &str) -> Result<(), TransportError>;
    fn mark_read(&self, conversation_id: &str) -> Result<(), TransportError>;
}
