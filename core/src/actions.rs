use crate::state::{AttachedReference, UserIdentity};

#[derive(Debug, Clone)]
pub enum AppAction {
    // Session
    StartSession {
        user: UserIdentity,
    },
    EndSession,

    // Conversation list
    RefreshConversations,
    OpenConversation {
        conversation_id: String,
    },
    CloseConversation,
    OpenSupportConversation,
    MarkConversationRead {
        conversation_id: String,
    },
    DeleteConversation {
        conversation_id: String,
    },

    // Composer
    SendMessage {
        conversation_id: String,
        body: String,
    },
    StageAttachment {
        conversation_id: String,
        reference: Option<AttachedReference>,
    },
    ComposerActivity {
        conversation_id: String,
    },
    DeleteMessage {
        conversation_id: String,
        message_id: String,
    },

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes message bodies).
    pub fn tag(&self) -> &'static str {
        match self {
            // Session
            AppAction::StartSession { .. } => "StartSession",
            AppAction::EndSession => "EndSession",

            // Conversation list
            AppAction::RefreshConversations => "RefreshConversations",
            AppAction::OpenConversation { .. } => "OpenConversation",
            AppAction::CloseConversation => "CloseConversation",
            AppAction::OpenSupportConversation => "OpenSupportConversation",
            AppAction::MarkConversationRead { .. } => "MarkConversationRead",
            AppAction::DeleteConversation { .. } => "DeleteConversation",

            // Composer
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::StageAttachment { .. } => "StageAttachment",
            AppAction::ComposerActivity { .. } => "ComposerActivity",
            AppAction::DeleteMessage { .. } => "DeleteMessage",

            // UI
            AppAction::ClearToast => "ClearToast",
        }
    }
}
