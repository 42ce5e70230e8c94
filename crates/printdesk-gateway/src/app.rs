use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use printdesk_core::PrintdeskConfig;
use printdesk_router::Dispatcher;
use printdesk_sessions::SessionStore;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: PrintdeskConfig,
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn new(
        config: PrintdeskConfig,
        dispatcher: Arc<Dispatcher>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            sessions,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/v1/messages", post(crate::http::messages::messages_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
