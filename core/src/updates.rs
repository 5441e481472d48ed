use crate::actions::AppAction;
use crate::core::normalize::{RawConversation, RawMessage};
use crate::state::AppState;
use crate::transport::ServerEvent;

#[derive(Debug, Clone)]
pub enum AppUpdate {
    /// Primary update stream: always a full state snapshot.
    ///
    /// Simplest reconciliation story for the view layer; listeners keep the
    /// highest `rev` they have seen and drop anything older.
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    /// Transport push, forwarded by the session event pump.
    Push(ServerEvent),

    // Async REST results
    ConversationsFetched {
        result: Result<Vec<RawConversation>, String>,
    },
    HistoryFetched {
        conversation_id: String,
        result: Result<Vec<RawMessage>, String>,
    },
    SupportConversationOpened {
        result: Result<RawConversation, String>,
    },
    ConversationDeleted {
        conversation_id: String,
        result: Result<(), String>,
    },
    MessageDeleted {
        conversation_id: String,
        message_id: String,
        result: Result<(), String>,
    },

    // Timers
    ComposerIdle {
        conversation_id: String,
        token: u64,
    },
    TypingSweep {
        conversation_id: String,
    },
    ToastExpired {
        token: u64,
    },
}
