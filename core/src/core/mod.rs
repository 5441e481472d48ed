mod config;
pub mod normalize;
mod session;
mod timeline;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use flume::Sender;
use uuid::Uuid;

use crate::actions::AppAction;
use crate::state::{
    now, AppState, AttachedReference, ChatMessage, ConnectionState, ConversationViewState,
    MessageDeliveryState, TypingPeer, UserIdentity, LOCAL_ID_PREFIX,
};
use crate::store::ConversationStore;
use crate::transport::{OutboundMessage, RealtimeTransport, ServerEvent};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use normalize::{normalize_conversation, normalize_message, RawConversation, RawMessage};
use timeline::{dedup_sorted, reconcile_echo};

pub use config::{load_app_config, AppConfig};

struct Session {
    user: UserIdentity,
    alive: Arc<AtomicBool>,
    /// The one conversation room currently joined on the transport.
    joined_room: Option<String>,
}

#[derive(Debug, Clone)]
struct TypingEntry {
    user_name: String,
    expires_at: DateTime<Utc>,
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: AppConfig,
    runtime: tokio::runtime::Runtime,
    store: Arc<dyn ConversationStore>,
    transport: Arc<dyn RealtimeTransport>,

    session: Option<Session>,

    // Server-confirmed messages for the active conversation only; discarded
    // on switch and teardown.
    history: Vec<ChatMessage>,
    // Optimistic placeholders awaiting their server echo, per conversation,
    // in insertion order.
    local_outbox: HashMap<String, Vec<ChatMessage>>,

    // conversation_id -> (user_id -> typing entry). Never persisted.
    typing_state: HashMap<String, HashMap<String, TypingEntry>>,
    // Last time we emitted start_typing per conversation, to debounce.
    last_typing_sent: HashMap<String, DateTime<Utc>>,

    composer_idle_token: u64,
    toast_dismiss_token: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        store: Arc<dyn ConversationStore>,
        transport: Arc<dyn RealtimeTransport>,
    ) -> Self {
        let config = config::load_app_config(&data_dir);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let this = Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            store,
            transport,
            session: None,
            history: Vec::new(),
            local_outbox: HashMap::new(),
            typing_state: HashMap::new(),
            last_typing_sent: HashMap::new(),
            composer_idle_token: 0,
            toast_dismiss_token: 0,
        };

        // Ensure `ChatApp::state()` has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                tracing::debug!(action = action.tag(), "action");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    // === Emission ===

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn toast(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::info!(toast = %msg, "toast");
        self.state.toast = Some(msg);
        self.toast_dismiss_token = self.toast_dismiss_token.wrapping_add(1);
        self.schedule_toast_auto_dismiss(self.toast_dismiss_token);
        self.emit_state();
    }

    fn schedule_toast_auto_dismiss(&self, token: u64) {
        let tx = self.core_sender.clone();
        let delay = Duration::from_secs(self.config.toast_dismiss_secs);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ToastExpired {
                token,
            })));
        });
    }

    fn handle_toast_expired(&mut self, token: u64) {
        if token != self.toast_dismiss_token {
            return; // a newer toast owns the slot
        }
        if self.state.toast.take().is_some() {
            self.emit_state();
        }
    }

    // === Small helpers ===

    fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn session_alive(&self) -> Option<Arc<AtomicBool>> {
        self.session.as_ref().map(|s| s.alive.clone())
    }

    fn active_conversation_id(&self) -> Option<String> {
        self.state.active.as_ref().map(|a| a.conversation_id.clone())
    }

    fn set_unread(&mut self, conversation_id: &str, count: u32) {
        if let Some(c) = self
            .state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            c.unread_count = count;
        }
    }

    fn sort_conversations(&mut self) {
        self.state
            .conversations
            .sort_by_key(|c| std::cmp::Reverse(c.activity_ts()));
    }

    // === Actions ===

    fn handle_action(&mut self, action: AppAction) {
        let session_free = matches!(
            action,
            AppAction::StartSession { .. } | AppAction::EndSession | AppAction::ClearToast
        );
        if !session_free && !self.has_session() {
            self.toast("No active session");
            return;
        }

        match action {
            AppAction::StartSession { user } => self.start_session(user),
            AppAction::EndSession => self.stop_session(),

            AppAction::RefreshConversations => self.refresh_conversations(),
            AppAction::OpenConversation { conversation_id } => {
                self.open_conversation(&conversation_id)
            }
            AppAction::CloseConversation => self.close_active(),
            AppAction::OpenSupportConversation => self.open_support_conversation(),
            AppAction::MarkConversationRead { conversation_id } => {
                self.mark_conversation_read(&conversation_id)
            }
            AppAction::DeleteConversation { conversation_id } => {
                self.request_delete_conversation(conversation_id)
            }

            AppAction::SendMessage {
                conversation_id,
                body,
            } => self.send_message(conversation_id, body),
            AppAction::StageAttachment {
                conversation_id,
                reference,
            } => self.stage_attachment(conversation_id, reference),
            AppAction::ComposerActivity { conversation_id } => {
                self.composer_activity(conversation_id)
            }
            AppAction::DeleteMessage {
                conversation_id,
                message_id,
            } => self.request_delete_message(conversation_id, message_id),

            AppAction::ClearToast => {
                self.state.toast = None;
                self.emit_state();
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::Push(event) => self.handle_push(event),
            InternalEvent::ConversationsFetched { result } => {
                self.handle_conversations_fetched(result)
            }
            InternalEvent::HistoryFetched {
                conversation_id,
                result,
            } => self.handle_history_fetched(conversation_id, result),
            InternalEvent::SupportConversationOpened { result } => {
                self.handle_support_opened(result)
            }
            InternalEvent::ConversationDeleted {
                conversation_id,
                result,
            } => self.handle_conversation_deleted(conversation_id, result),
            InternalEvent::MessageDeleted {
                conversation_id,
                message_id,
                result,
            } => self.handle_message_deleted(conversation_id, message_id, result),
            InternalEvent::ComposerIdle {
                conversation_id,
                token,
            } => self.handle_composer_idle(conversation_id, token),
            InternalEvent::TypingSweep { conversation_id } => {
                self.handle_typing_sweep(conversation_id)
            }
            InternalEvent::ToastExpired { token } => self.handle_toast_expired(token),
        }
    }

    fn handle_push(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::NewMessage {
                conversation_id,
                message,
            } => self.handle_new_message(conversation_id, message),
            ServerEvent::Typing {
                conversation_id,
                user_id,
                user_name,
                is_typing,
            } => self.handle_typing(conversation_id, user_id, user_name, is_typing),
            ServerEvent::MessageRead {
                conversation_id,
                user_id,
            } => self.apply_read_receipt(conversation_id, user_id),
            ServerEvent::ConversationUpdated {
                conversation_id,
                last_message,
                last_message_at,
            } => self.handle_conversation_updated(conversation_id, last_message, last_message_at),
            ServerEvent::Reconnected => self.handle_reconnected(),
        }
    }

    // === Conversation list (§ list reconciliation) ===

    pub(super) fn refresh_conversations(&self) {
        let Some(alive) = self.session_alive() else {
            return;
        };
        let store = self.store.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = store.list_conversations().await.map_err(|e| e.to_string());
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::ConversationsFetched { result },
            )));
        });
    }

    fn handle_conversations_fetched(&mut self, result: Result<Vec<RawConversation>, String>) {
        let raws = match result {
            Ok(raws) => raws,
            Err(e) => {
                tracing::warn!(%e, "conversation list fetch failed");
                self.toast(format!("Could not load conversations: {e}"));
                return;
            }
        };

        // First occurrence of each id wins.
        let mut seen: HashSet<String> = HashSet::new();
        let mut list = Vec::new();
        for raw in raws {
            let Some(summary) = normalize_conversation(raw) else {
                tracing::debug!("dropping conversation without id");
                continue;
            };
            if seen.insert(summary.id.clone()) {
                list.push(summary);
            }
        }

        // An open conversation at tail is read, whatever the server says.
        if let Some(active_id) = self.active_conversation_id() {
            if let Some(c) = list.iter_mut().find(|c| c.id == active_id) {
                c.unread_count = 0;
            }
        }

        self.state.conversations = list;
        self.sort_conversations();
        self.emit_state();
    }

    fn open_conversation(&mut self, conversation_id: &str) {
        // Leaving a conversation ends our typing signal there.
        self.composer_idle_token = self.composer_idle_token.wrapping_add(1);
        if let Some(prev) = self.active_conversation_id() {
            if prev != conversation_id {
                self.last_typing_sent.remove(&prev);
                let _ = self.transport.stop_typing(&prev);
            }
        }

        self.join_conversation_room(conversation_id);

        self.history.clear();
        self.state.active = Some(ConversationViewState {
            conversation_id: conversation_id.to_string(),
            messages: Vec::new(),
            typing: Vec::new(),
            history_loaded: false,
            staged_attachment: None,
        });
        self.set_unread(conversation_id, 0);
        self.rebuild_timeline();

        self.mark_read_remote(conversation_id);
        self.fetch_history(conversation_id);
    }

    fn close_active(&mut self) {
        self.composer_idle_token = self.composer_idle_token.wrapping_add(1);
        self.leave_joined_room();
        self.history.clear();
        self.state.active = None;
        self.emit_state();
    }

    pub(super) fn fetch_history(&self, conversation_id: &str) {
        let Some(alive) = self.session_alive() else {
            return;
        };
        let store = self.store.clone();
        let tx = self.core_sender.clone();
        let id = conversation_id.to_string();
        self.runtime.spawn(async move {
            let result = store.message_history(&id).await.map_err(|e| e.to_string());
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::HistoryFetched {
                conversation_id: id,
                result,
            })));
        });
    }

    fn handle_history_fetched(
        &mut self,
        conversation_id: String,
        result: Result<Vec<RawMessage>, String>,
    ) {
        // A fetch that raced a conversation switch must not resurrect the
        // torn-down view. The active id is read now, not at request time.
        if self.active_conversation_id().as_deref() != Some(conversation_id.as_str()) {
            tracing::debug!(conversation_id = %conversation_id, "discarding stale history response");
            return;
        }

        let raws = match result {
            Ok(raws) => raws,
            Err(e) => {
                tracing::warn!(%e, conversation_id = %conversation_id, "history fetch failed");
                self.toast(format!("Could not load messages: {e}"));
                return;
            }
        };

        // Merge rather than replace: a push that raced this fetch already
        // landed in `history`, and the dedup gate collapses the overlap.
        let mut merged = std::mem::take(&mut self.history);
        merged.extend(
            raws.into_iter()
                .map(|raw| normalize_message(raw, &conversation_id)),
        );
        self.history = dedup_sorted(merged);

        if let Some(active) = self.state.active.as_mut() {
            active.history_loaded = true;
        }
        self.rebuild_timeline();
    }

    /// Recompute the visible list for the active conversation. Sole writer
    /// of `active.messages`; every path funnels through `dedup_sorted`.
    fn rebuild_timeline(&mut self) {
        let Some(conversation_id) = self.active_conversation_id() else {
            return;
        };
        let mut merged = self.history.clone();
        if let Some(outbox) = self.local_outbox.get(&conversation_id) {
            merged.extend(outbox.iter().cloned());
        }
        let visible = dedup_sorted(merged);
        let typing = self.active_typers(&conversation_id);
        if let Some(active) = self.state.active.as_mut() {
            active.messages = visible;
            active.typing = typing;
        }
        self.emit_state();
    }

    // === Optimistic send pipeline ===

    fn send_message(&mut self, conversation_id: String, body: String) {
        let Some(user) = self.session.as_ref().map(|s| s.user.clone()) else {
            return;
        };

        let body = body.trim().to_string();
        // Consume the staged attachment up front so a double-tap cannot send
        // it twice; it is restored if dispatch fails.
        let attachment = self
            .state
            .active
            .as_mut()
            .filter(|a| a.conversation_id == conversation_id)
            .and_then(|a| a.staged_attachment.take());

        if body.is_empty() && attachment.is_none() {
            return;
        }

        let created_at = now();
        let placeholder = ChatMessage {
            id: format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()),
            conversation_id: conversation_id.clone(),
            sender_id: user.id.clone(),
            sender_name: user.name.clone(),
            sender_email: user.email.clone(),
            body: body.clone(),
            attached_reference: attachment.clone(),
            read_by: vec![user.id],
            created_at,
            updated_at: created_at,
            delivery: MessageDeliveryState::Pending,
        };
        let placeholder_id = placeholder.id.clone();
        let preview = preview_of(&placeholder);

        self.local_outbox
            .entry(conversation_id.clone())
            .or_default()
            .push(placeholder);
        self.touch_conversation(&conversation_id, Some(preview), Some(created_at));
        self.rebuild_timeline();

        // Our own send ends our typing signal.
        self.composer_idle_token = self.composer_idle_token.wrapping_add(1);
        self.last_typing_sent.remove(&conversation_id);
        let _ = self.transport.stop_typing(&conversation_id);

        let outbound = OutboundMessage {
            conversation_id: conversation_id.clone(),
            body,
            attached_reference: attachment.clone(),
        };
        if let Err(e) = self.transport.send_message(outbound) {
            tracing::warn!(%e, conversation_id = %conversation_id, "message dispatch failed");
            if let Some(outbox) = self.local_outbox.get_mut(&conversation_id) {
                outbox.retain(|m| m.id != placeholder_id);
            }
            if let Some(active) = self
                .state
                .active
                .as_mut()
                .filter(|a| a.conversation_id == conversation_id)
            {
                active.staged_attachment = attachment;
            }
            self.toast(format!("Message not sent: {e}"));
            self.rebuild_timeline();
        }
    }

    fn stage_attachment(
        &mut self,
        conversation_id: String,
        reference: Option<AttachedReference>,
    ) {
        let Some(active) = self
            .state
            .active
            .as_mut()
            .filter(|a| a.conversation_id == conversation_id)
        else {
            return;
        };
        active.staged_attachment = reference;
        self.emit_state();
    }

    // === Inbound messages ===

    fn handle_new_message(&mut self, conversation_id: String, raw: RawMessage) {
        let message = normalize_message(raw, &conversation_id);
        let my_id = self.session.as_ref().map(|s| s.user.id.clone());

        // A real message from a peer supersedes their typing indicator.
        if let Some(map) = self.typing_state.get_mut(&conversation_id) {
            map.remove(&message.sender_id);
        }

        if self.active_conversation_id().as_deref() == Some(conversation_id.as_str()) {
            if my_id.as_deref() == Some(message.sender_id.as_str()) {
                if let Some(outbox) = self.local_outbox.get_mut(&conversation_id) {
                    if let Some(consumed) =
                        reconcile_echo(outbox, &message, self.config.echo_match_window_ms)
                    {
                        tracing::debug!(
                            placeholder_id = %consumed.id,
                            message_id = %message.id,
                            "reconciled optimistic send"
                        );
                    }
                }
            }
            let preview = preview_of(&message);
            let created_at = message.created_at;
            self.history.push(message);
            self.touch_conversation(&conversation_id, Some(preview), Some(created_at));
            self.set_unread(&conversation_id, 0);
            // Receiving the tail while the conversation is open is an
            // implicit read.
            let _ = self.transport.mark_read(&conversation_id);
            self.rebuild_timeline();
        } else {
            let mut known = false;
            if let Some(c) = self
                .state
                .conversations
                .iter_mut()
                .find(|c| c.id == conversation_id)
            {
                c.unread_count += 1;
                c.last_message_preview = Some(preview_of(&message));
                c.last_activity_at = Some(message.created_at);
                known = true;
            }
            if known {
                self.sort_conversations();
                self.emit_state();
            } else {
                tracing::debug!(conversation_id = %conversation_id, "push for unknown conversation, refreshing list");
                self.refresh_conversations();
            }
        }
    }

    fn touch_conversation(
        &mut self,
        conversation_id: &str,
        preview: Option<String>,
        at: Option<DateTime<Utc>>,
    ) {
        let Some(c) = self
            .state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        else {
            return;
        };
        if preview.is_some() {
            c.last_message_preview = preview;
        }
        if at.is_some() {
            c.last_activity_at = at;
        }
        self.sort_conversations();
    }

    fn handle_conversation_updated(
        &mut self,
        conversation_id: String,
        last_message: Option<String>,
        last_message_at: Option<DateTime<Utc>>,
    ) {
        let known = self
            .state
            .conversations
            .iter()
            .any(|c| c.id == conversation_id);
        if known {
            self.touch_conversation(&conversation_id, last_message, last_message_at);
            self.emit_state();
        } else {
            self.refresh_conversations();
        }
    }

    // === Read receipts ===

    /// Monotonic union; receipts are never retracted. Only the active
    /// conversation has a timeline to annotate.
    fn apply_read_receipt(&mut self, conversation_id: String, user_id: String) {
        if self.active_conversation_id().as_deref() != Some(conversation_id.as_str()) {
            return;
        }
        for m in self.history.iter_mut() {
            if !m.read_by.contains(&user_id) {
                m.read_by.push(user_id.clone());
            }
        }
        if let Some(outbox) = self.local_outbox.get_mut(&conversation_id) {
            for m in outbox.iter_mut() {
                if !m.read_by.contains(&user_id) {
                    m.read_by.push(user_id.clone());
                }
            }
        }
        self.rebuild_timeline();
    }

    fn mark_conversation_read(&mut self, conversation_id: &str) {
        self.set_unread(conversation_id, 0);
        self.emit_state();
        self.mark_read_remote(conversation_id);
    }

    fn mark_read_remote(&self, conversation_id: &str) {
        if let Err(e) = self.transport.mark_read(conversation_id) {
            tracing::debug!(%e, conversation_id = %conversation_id, "mark_read emit failed");
        }
        let store = self.store.clone();
        let id = conversation_id.to_string();
        self.runtime.spawn(async move {
            if let Err(e) = store.mark_read(&id).await {
                tracing::debug!(%e, conversation_id = %id, "mark_read store call failed");
            }
        });
    }

    // === Typing indicators ===

    fn handle_typing(
        &mut self,
        conversation_id: String,
        user_id: String,
        user_name: String,
        is_typing: bool,
    ) {
        // Self-typing is never displayed to self.
        if self.session.as_ref().map(|s| s.user.id.as_str()) == Some(user_id.as_str()) {
            return;
        }
        {
            let map = self.typing_state.entry(conversation_id.clone()).or_default();
            if is_typing {
                let expires_at =
                    now() + chrono::Duration::milliseconds(self.config.typing_ttl_ms);
                map.insert(user_id, TypingEntry {
                    user_name,
                    expires_at,
                });
            } else {
                map.remove(&user_id);
            }
        }
        if is_typing {
            self.schedule_typing_sweep(&conversation_id);
        }
        self.refresh_typing_if_active(&conversation_id);
    }

    fn schedule_typing_sweep(&self, conversation_id: &str) {
        let tx = self.core_sender.clone();
        let id = conversation_id.to_string();
        // A hair past the TTL so the entry is expired when the sweep runs.
        let delay = Duration::from_millis(self.config.typing_ttl_ms.max(0) as u64 + 50);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::TypingSweep {
                conversation_id: id,
            })));
        });
    }

    fn handle_typing_sweep(&mut self, conversation_id: String) {
        let sweep_at = now();
        if let Some(map) = self.typing_state.get_mut(&conversation_id) {
            map.retain(|_, e| e.expires_at > sweep_at);
        }
        self.refresh_typing_if_active(&conversation_id);
    }

    fn active_typers(&mut self, conversation_id: &str) -> Vec<TypingPeer> {
        let read_at = now();
        let Some(map) = self.typing_state.get_mut(conversation_id) else {
            return Vec::new();
        };
        map.retain(|_, e| e.expires_at > read_at);
        let mut peers: Vec<TypingPeer> = map
            .iter()
            .map(|(user_id, e)| TypingPeer {
                user_id: user_id.clone(),
                user_name: e.user_name.clone(),
            })
            .collect();
        peers.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        peers
    }

    fn refresh_typing_if_active(&mut self, conversation_id: &str) {
        if self.active_conversation_id().as_deref() != Some(conversation_id) {
            return;
        }
        let typing = self.active_typers(conversation_id);
        if let Some(active) = self.state.active.as_mut() {
            active.typing = typing;
        }
        self.emit_state();
    }

    /// Own keystrokes: debounced start-typing emission plus a single
    /// outstanding stop timer, rescheduled on every keystroke.
    fn composer_activity(&mut self, conversation_id: String) {
        if self.active_conversation_id().as_deref() != Some(conversation_id.as_str()) {
            return;
        }

        let at = now();
        // Re-emit at half the peer TTL so continuous typing keeps the
        // remote indicator alive.
        let resend = chrono::Duration::milliseconds(self.config.typing_ttl_ms / 2);
        let should_emit = self
            .last_typing_sent
            .get(&conversation_id)
            .map(|t| at - *t >= resend)
            .unwrap_or(true);
        if should_emit {
            if let Err(e) = self.transport.start_typing(&conversation_id) {
                tracing::debug!(%e, conversation_id = %conversation_id, "start_typing emit failed");
            }
            self.last_typing_sent.insert(conversation_id.clone(), at);
        }

        self.composer_idle_token = self.composer_idle_token.wrapping_add(1);
        let token = self.composer_idle_token;
        let tx = self.core_sender.clone();
        let id = conversation_id;
        let delay = Duration::from_millis(self.config.typing_ttl_ms.max(0) as u64);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ComposerIdle {
                conversation_id: id,
                token,
            })));
        });
    }

    fn handle_composer_idle(&mut self, conversation_id: String, token: u64) {
        if token != self.composer_idle_token {
            return; // superseded by a newer keystroke or a send
        }
        self.last_typing_sent.remove(&conversation_id);
        if let Err(e) = self.transport.stop_typing(&conversation_id) {
            tracing::debug!(%e, conversation_id = %conversation_id, "stop_typing emit failed");
        }
    }

    // === Deletion ===

    fn request_delete_conversation(&mut self, conversation_id: String) {
        let Some(alive) = self.session_alive() else {
            return;
        };
        let store = self.store.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = store
                .delete_conversation(&conversation_id)
                .await
                .map_err(|e| e.to_string());
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::ConversationDeleted {
                    conversation_id,
                    result,
                },
            )));
        });
    }

    fn handle_conversation_deleted(
        &mut self,
        conversation_id: String,
        result: Result<(), String>,
    ) {
        if let Err(e) = result {
            self.toast(format!("Could not delete conversation: {e}"));
            return;
        }
        self.state.conversations.retain(|c| c.id != conversation_id);
        self.local_outbox.remove(&conversation_id);
        self.typing_state.remove(&conversation_id);
        if self.active_conversation_id().as_deref() == Some(conversation_id.as_str()) {
            self.close_active();
        } else {
            self.emit_state();
        }
    }

    fn request_delete_message(&mut self, conversation_id: String, message_id: String) {
        let Some(alive) = self.session_alive() else {
            return;
        };
        let store = self.store.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = store
                .delete_message(&message_id)
                .await
                .map_err(|e| e.to_string());
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::MessageDeleted {
                conversation_id,
                message_id,
                result,
            })));
        });
    }

    fn handle_message_deleted(
        &mut self,
        conversation_id: String,
        message_id: String,
        result: Result<(), String>,
    ) {
        if let Err(e) = result {
            self.toast(format!("Could not delete message: {e}"));
            return;
        }
        self.history.retain(|m| m.id != message_id);
        if let Some(outbox) = self.local_outbox.get_mut(&conversation_id) {
            outbox.retain(|m| m.id != message_id);
        }
        if self.active_conversation_id().as_deref() == Some(conversation_id.as_str()) {
            self.rebuild_timeline();
        }
    }

    // === Support conversation ===

    fn open_support_conversation(&mut self) {
        let Some(alive) = self.session_alive() else {
            return;
        };
        let store = self.store.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = store
                .open_support_conversation()
                .await
                .map_err(|e| e.to_string());
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::SupportConversationOpened { result },
            )));
        });
    }

    fn handle_support_opened(&mut self, result: Result<RawConversation, String>) {
        match result.map(normalize_conversation) {
            Ok(Some(summary)) => {
                let id = summary.id.clone();
                if let Some(existing) = self
                    .state
                    .conversations
                    .iter_mut()
                    .find(|c| c.id == id)
                {
                    *existing = summary;
                } else {
                    self.state.conversations.push(summary);
                }
                self.sort_conversations();
                self.open_conversation(&id);
            }
            Ok(None) => self.toast("Support is unavailable right now"),
            Err(e) => self.toast(format!("Could not reach support: {e}")),
        }
    }
}

fn preview_of(message: &ChatMessage) -> String {
    if !message.body.is_empty() {
        return message.body.clone();
    }
    match &message.attached_reference {
        Some(r) => r.preview.clone().unwrap_or_else(|| r.kind.clone()),
        None => String::new(),
    }
}
