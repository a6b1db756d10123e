//! HTTP API for the pairing proxy.

mod handlers;
mod middleware;
mod types;

pub use handlers::*;
pub use middleware::logging_middleware;
pub use types::*;

use crate::session::SessionManager;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Pairing lifecycle manager
    pub manager: SessionManager,
}

impl AppState {
    /// Create new application state.
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/pair", post(handlers::pair))
        .route("/status/:number", get(handlers::get_status))
        .route("/session/:number", get(handlers::get_session))
        .layer(axum_middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
