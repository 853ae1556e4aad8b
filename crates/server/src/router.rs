//! HTTP router construction.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::api;
use crate::state::AppState;

/// Trigger path kept identical to the scheduler's existing cron entry.
pub const TRIGGER_PATH: &str = "/tasks/transfer_bucket_access_to_bq";

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route(TRIGGER_PATH, get(api::transfer_bucket_access_to_bq))
        .with_state(state)
}
