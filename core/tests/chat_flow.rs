//! End-to-end flow through the public surface: session start, conversation
//! list, history, optimistic send + echo reconciliation, unread counters,
//! typing indicators. Store and transport are in-process fakes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use souk_core::{
    AppAction, AppUpdate, ChatApp, ConversationStore, OutboundMessage, RawConversation,
    RawMessage, RealtimeTransport, ServerEvent, StoreError, TransportError, UpdateListener,
    UserIdentity,
};

fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

struct FakeStore {
    conversations: Vec<RawConversation>,
    history: HashMap<String, Vec<RawMessage>>,
}

#[async_trait]
impl ConversationStore for FakeStore {
    async fn list_conversations(&self) -> Result<Vec<RawConversation>, StoreError> {
        Ok(self.conversations.clone())
    }
    async fn message_history(&self, conversation_id: &str) -> Result<Vec<RawMessage>, StoreError> {
        Ok(self.history.get(conversation_id).cloned().unwrap_or_default())
    }
    async fn open_support_conversation(&self) -> Result<RawConversation, StoreError> {
        Ok(serde_json::from_value(json!({"id": "support-1"})).unwrap())
    }
    async fn mark_read(&self, _: &str) -> Result<(), StoreError> {
        Ok(())
    }
    async fn delete_conversation(&self, _: &str) -> Result<(), StoreError> {
        Ok(())
    }
    async fn delete_message(&self, _: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeTransport {
    event_tx: Mutex<Option<flume::Sender<ServerEvent>>>,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl FakeTransport {
    fn push(&self, event: ServerEvent) {
        if let Some(tx) = self.event_tx.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }
}

impl RealtimeTransport for FakeTransport {
    fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }
    fn disconnect(&self) {
        *self.event_tx.lock().unwrap() = None;
    }
    fn subscribe(&self) -> flume::Receiver<ServerEvent> {
        let (tx, rx) = flume::unbounded();
        *self.event_tx.lock().unwrap() = Some(tx);
        rx
    }
    fn join_room(&self, _: &str) -> Result<(), TransportError> {
        Ok(())
    }
    fn leave_room(&self, _: &str) -> Result<(), TransportError> {
        Ok(())
    }
    fn send_message(&self, message: OutboundMessage) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
    fn start_typing(&self, _: &str) -> Result<(), TransportError> {
        Ok(())
    }
    fn stop_typing(&self, _: &str) -> Result<(), TransportError> {
        Ok(())
    }
    fn mark_read(&self, _: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

fn raw_message(id: &str, sender: &str, body: &str, created_at: &str) -> RawMessage {
    serde_json::from_value(json!({
        "id": id,
        "sender": {"id": sender, "name": sender},
        "body": body,
        "createdAt": created_at,
    }))
    .unwrap()
}

fn make_app() -> (Arc<ChatApp>, Arc<FakeTransport>, tempfile::TempDir) {
    let store = Arc::new(FakeStore {
        conversations: vec![
            serde_json::from_value(json!({"id": "c1", "unreadCount": 0})).unwrap(),
            serde_json::from_value(json!({"id": "c2", "unreadCount": 0})).unwrap(),
        ],
        history: HashMap::from([(
            "c1".to_string(),
            vec![raw_message("m1", "u2", "welcome", "2026-08-01T10:00:00Z")],
        )]),
    });
    let transport = Arc::new(FakeTransport::default());
    let dir = tempfile::tempdir().expect("tempdir");
    let app = ChatApp::new(
        dir.path().to_string_lossy().to_string(),
        store,
        transport.clone(),
    );
    (app, transport, dir)
}

fn me() -> UserIdentity {
    UserIdentity {
        id: "me".into(),
        name: "Me".into(),
        email: None,
    }
}

#[test]
fn full_chat_round_trip() {
    let (app, transport, _dir) = make_app();

    app.dispatch(AppAction::StartSession { user: me() });
    wait_until("conversation list loads", Duration::from_secs(5), || {
        app.state().conversations.len() == 2
    });

    app.dispatch(AppAction::OpenConversation {
        conversation_id: "c1".into(),
    });
    wait_until("history loads", Duration::from_secs(5), || {
        app.state()
            .active
            .map(|a| a.history_loaded && a.messages.len() == 1)
            .unwrap_or(false)
    });

    // Optimistic send: visible immediately, before any echo.
    app.dispatch(AppAction::SendMessage {
        conversation_id: "c1".into(),
        body: "hi, about my order".into(),
    });
    wait_until("placeholder visible", Duration::from_secs(5), || {
        let state = app.state();
        let Some(active) = state.active.as_ref() else {
            return false;
        };
        active.messages.len() == 2 && active.messages[1].is_placeholder()
    });
    assert_eq!(transport.sent.lock().unwrap().len(), 1);

    // Server echo inside the match window replaces the placeholder.
    let placeholder_at = app.state().active.unwrap().messages[1].created_at;
    transport.push(ServerEvent::NewMessage {
        conversation_id: "c1".into(),
        message: raw_message("srv-1", "me", "hi, about my order", &placeholder_at.to_rfc3339()),
    });
    wait_until("echo reconciled", Duration::from_secs(5), || {
        let state = app.state();
        let Some(active) = state.active.as_ref() else {
            return false;
        };
        active.messages.len() == 2
            && active.messages.iter().all(|m| !m.is_placeholder())
            && active.messages.iter().any(|m| m.id == "srv-1")
    });

    // A push for a background conversation bumps its unread counter.
    transport.push(ServerEvent::NewMessage {
        conversation_id: "c2".into(),
        message: raw_message("m9", "u9", "other thread", "2026-08-01T11:00:00Z"),
    });
    wait_until("unread bumped", Duration::from_secs(5), || {
        app.state()
            .conversations
            .iter()
            .find(|c| c.id == "c2")
            .map(|c| c.unread_count == 1)
            .unwrap_or(false)
    });

    // Typing indicator appears and clears with the stop signal.
    transport.push(ServerEvent::Typing {
        conversation_id: "c1".into(),
        user_id: "u2".into(),
        user_name: "Alice".into(),
        is_typing: true,
    });
    wait_until("typing shown", Duration::from_secs(5), || {
        app.state()
            .active
            .map(|a| a.typing.iter().any(|t| t.user_name == "Alice"))
            .unwrap_or(false)
    });
    transport.push(ServerEvent::Typing {
        conversation_id: "c1".into(),
        user_id: "u2".into(),
        user_name: "Alice".into(),
        is_typing: false,
    });
    wait_until("typing cleared", Duration::from_secs(5), || {
        app.state().active.map(|a| a.typing.is_empty()).unwrap_or(false)
    });

    app.dispatch(AppAction::EndSession);
    wait_until("session torn down", Duration::from_secs(5), || {
        let state = app.state();
        state.active.is_none() && state.conversations.is_empty()
    });
}

#[test]
fn update_stream_carries_monotonic_revs() {
    let (app, _transport, _dir) = make_app();

    struct Collector {
        revs: Arc<Mutex<Vec<u64>>>,
    }
    impl UpdateListener for Collector {
        fn on_update(&self, update: AppUpdate) {
            self.revs.lock().unwrap().push(update.rev());
        }
    }
    let revs = Arc::new(Mutex::new(Vec::new()));
    app.listen_for_updates(Box::new(Collector { revs: revs.clone() }));

    app.dispatch(AppAction::StartSession { user: me() });
    wait_until("some updates observed", Duration::from_secs(5), || {
        revs.lock().unwrap().len() >= 3
    });

    let seen = revs.lock().unwrap().clone();
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "revs not monotonic: {seen:?}");
}

#[test]
fn typing_indicator_expires_without_renewal() {
    let (app, transport, _dir) = make_app();

    app.dispatch(AppAction::StartSession { user: me() });
    wait_until("conversation list loads", Duration::from_secs(5), || {
        app.state().conversations.len() == 2
    });
    app.dispatch(AppAction::OpenConversation {
        conversation_id: "c1".into(),
    });
    wait_until("history loads", Duration::from_secs(5), || {
        app.state().active.map(|a| a.history_loaded).unwrap_or(false)
    });

    transport.push(ServerEvent::Typing {
        conversation_id: "c1".into(),
        user_id: "u2".into(),
        user_name: "Alice".into(),
        is_typing: true,
    });
    wait_until("typing shown", Duration::from_secs(5), || {
        app.state()
            .active
            .map(|a| !a.typing.is_empty())
            .unwrap_or(false)
    });

    // No renewal: the quiet-period sweep removes the entry on its own.
    wait_until("typing expired", Duration::from_secs(5), || {
        app.state().active.map(|a| a.typing.is_empty()).unwrap_or(false)
    });
}
