// Session + room lifecycle and the transport event pump.

use super::*;

impl AppCore {
    pub(super) fn start_session(&mut self, user: UserIdentity) {
        // Tear down any existing session first.
        self.stop_session();

        tracing::info!(user_id = %user.id, "start_session");
        self.state.connection = ConnectionState::Connecting;
        self.state.user = Some(user.clone());
        self.emit_state();

        if let Err(e) = self.transport.connect() {
            tracing::warn!(%e, "transport connect failed");
            self.state.connection = ConnectionState::Disconnected;
            self.state.user = None;
            self.toast(format!("Could not connect: {e}"));
            return;
        }

        let alive = Arc::new(AtomicBool::new(true));
        self.session = Some(Session {
            user,
            alive: alive.clone(),
            joined_room: None,
        });
        self.state.connection = ConnectionState::Connected;
        self.emit_state();

        self.start_event_pump(alive);
        self.refresh_conversations();
    }

    /// Forward transport pushes into the actor inbox. One pump per session;
    /// every event type flows through this single handler registration, so
    /// re-subscription cannot double-deliver. The `alive` flag stops
    /// delivery to a torn-down session.
    fn start_event_pump(&self, alive: Arc<AtomicBool>) {
        let rx = self.transport.subscribe();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            while let Ok(event) = rx.recv_async().await {
                if !alive.load(Ordering::SeqCst) {
                    // Dropping `rx` here is the unsubscribe.
                    return;
                }
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::Push(event))));
            }
        });
    }

    pub(super) fn stop_session(&mut self) {
        // Invalidate outstanding composer/toast timers.
        self.composer_idle_token = self.composer_idle_token.wrapping_add(1);

        let Some(sess) = self.session.take() else {
            return;
        };
        tracing::info!(user_id = %sess.user.id, "stop_session");
        sess.alive.store(false, Ordering::SeqCst);
        if let Some(room) = sess.joined_room {
            if let Err(e) = self.transport.leave_room(&room) {
                tracing::debug!(%e, conversation_id = %room, "leave_room on teardown failed");
            }
        }
        self.transport.disconnect();

        // Session-scoped state dies with the session.
        self.history.clear();
        self.local_outbox.clear();
        self.typing_state.clear();
        self.last_typing_sent.clear();
        self.state = AppState::empty();
        self.emit_state();
    }

    /// Exactly one conversation room is joined at a time: the previous room
    /// is left before the new one is joined.
    pub(super) fn join_conversation_room(&mut self, conversation_id: &str) {
        let prev = match self.session.as_mut() {
            Some(sess) => {
                if sess.joined_room.as_deref() == Some(conversation_id) {
                    return;
                }
                sess.joined_room.take()
            }
            None => return,
        };
        if let Some(prev) = prev {
            if let Err(e) = self.transport.leave_room(&prev) {
                tracing::debug!(%e, conversation_id = %prev, "leave_room failed");
            }
        }
        match self.transport.join_room(conversation_id) {
            Ok(()) => {
                if let Some(sess) = self.session.as_mut() {
                    sess.joined_room = Some(conversation_id.to_string());
                }
                tracing::info!(conversation_id = %conversation_id, "joined_room");
            }
            Err(e) => {
                tracing::warn!(%e, conversation_id = %conversation_id, "join_room failed");
                self.toast("Live updates unavailable for this conversation");
            }
        }
    }

    pub(super) fn leave_joined_room(&mut self) {
        let room = self.session.as_mut().and_then(|s| s.joined_room.take());
        if let Some(room) = room {
            if let Err(e) = self.transport.leave_room(&room) {
                tracing::debug!(%e, conversation_id = %room, "leave_room failed");
            }
        }
    }

    /// The transport re-established its connection: server-side room
    /// membership is gone, so re-join the active room and refetch whatever
    /// pushes were missed while offline.
    pub(super) fn handle_reconnected(&mut self) {
        tracing::info!("transport reconnected");
        if let Some(sess) = self.session.as_mut() {
            sess.joined_room = None;
        }
        if let Some(active_id) = self
            .state
            .active
            .as_ref()
            .map(|a| a.conversation_id.clone())
        {
            self.join_conversation_room(&active_id);
            self.fetch_history(&active_id);
        }
        self.refresh_conversations();
    }
}
