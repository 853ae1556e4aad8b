//! HTTP handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    ingest_running: bool,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        ingest_running: state.is_running(),
    })
}

/// Run one ingest pass. Always answers 200 with an empty body; outcomes are
/// only visible in the logs.
///
/// The pass runs in its own task holding the run lock, so a client that
/// hangs up mid-pass does not abort a load between submit and archive.
pub async fn transfer_bucket_access_to_bq(State(state): State<Arc<AppState>>) -> &'static str {
    let Ok(guard) = state.run_lock.clone().try_lock_owned() else {
        warn!("Ingest pass already running, trigger ignored");
        return "";
    };

    info!("Ingest pass triggered");
    let task_state = state.clone();
    let pass = tokio::spawn(async move {
        let _guard = guard;
        run_pass(&task_state).await;
    });
    if let Err(e) = pass.await {
        error!("Ingest pass task ended abnormally: {}", e);
    }
    ""
}

async fn run_pass(state: &AppState) {
    match state.orchestrator.run(&state.shutdown).await {
        Ok(report) => info!(
            tenants = report.tenants.len(),
            files = report.files_loaded(),
            rows = report.rows_loaded(),
            "Ingest pass finished"
        ),
        Err(e) => error!("Ingest pass failed: {:#}", anyhow::Error::new(e)),
    }
}
