pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::lifecycle::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Browser form
        .route("/", get(handlers::handle_page))
        .route("/optimize", post(handlers::handle_form_submit))
        .route("/reset", post(handlers::handle_form_reset))
        // JSON view of the same lifecycle
        .route("/api/state", get(handlers::handle_get_state))
        .route("/api/optimize", post(handlers::handle_api_submit))
        .route("/api/poll", post(handlers::handle_api_poll))
        .route("/api/reset", post(handlers::handle_api_reset))
        .with_state(state)
}
