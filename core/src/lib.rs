//! Session-scoped real-time chat synchronization engine for the souk
//! storefront. The storefront's view layers dispatch [`AppAction`]s and
//! render [`AppState`] snapshots; everything between is owned by the
//! single-threaded core behind [`ChatApp`].

mod actions;
mod core;
mod logging;
mod state;
mod store;
mod transport;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use crate::core::normalize::{
    RawConversation, RawLastMessage, RawMessage, RawParticipant, RawSender,
};
pub use crate::core::{load_app_config, AppConfig};
pub use logging::init_logging;
pub use state::*;
pub use store::{ConversationStore, HttpConversationStore, StoreError};
pub use transport::{OutboundMessage, RealtimeTransport, ServerEvent, TransportError};
pub use updates::{AppUpdate, CoreMsg, InternalEvent};

/// Receives every snapshot the core emits, in order.
pub trait UpdateListener: Send + Sync + 'static {
    fn on_update(&self, update: AppUpdate);
}

pub struct ChatApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

impl ChatApp {
    /// Construct the engine for one view session. The conversation store and
    /// transport are injected; nothing here is ambient or global.
    pub fn new(
        data_dir: String,
        store: Arc<dyn ConversationStore>,
        transport: Arc<dyn RealtimeTransport>,
    ) -> Arc<Self> {
        logging::init_logging();
        tracing::info!(data_dir = %data_dir, "ChatApp starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        // Actor loop thread (single-threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                store,
                transport,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    /// Contract: never blocks the caller.
    pub fn dispatch(&self, action: AppAction) {
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, listener: Box<dyn UpdateListener>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split the stream.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                listener.on_update(update);
            }
        });
    }
}
