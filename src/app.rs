//! Application state
//!
//! Wires settings, the conversation store and the responder into the
//! controller the front-end drives.

use std::sync::Arc;

use crate::chat::ChatController;
use crate::responder::Responder;
use crate::storage::conversations::ConversationStore;
use crate::storage::settings::AppSettings;

/// Everything one front-end session works with
pub struct AppState<R: Responder> {
    pub settings: AppSettings,
    pub controller: ChatController<R>,
}

impl<R: Responder> AppState<R> {
    pub fn new(settings: AppSettings, responder: R) -> Self {
        let store = Arc::new(ConversationStore::open(settings.history_path()));
        tracing::info!("AppState initialized");
        Self {
            settings,
            controller: ChatController::new(store, Arc::new(responder)),
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        self.controller.store()
    }
}
