mod api;
mod cli;
mod router;
mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bucketlog_core::Config;
use bucketlog_ingest::Orchestrator;
use bucketlog_storage::BucketStore;
use bucketlog_warehouse::BigQueryClient;

use crate::cli::{CliArgs, Command};
use crate::state::AppState;

/// Build the warehouse and storage clients. Failing here is fatal for the
/// whole invocation.
fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let warehouse = BigQueryClient::new(&config.gcp, &config.ingest.location)
        .context("building BigQuery client")?;
    let storage = BucketStore::from_config(&config.storage, &config.gcp);
    Ok(Orchestrator::from_config(config, Arc::new(warehouse), Arc::new(storage)))
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown requested");
            token.cancel();
        }
    });
}

async fn serve(config: &Config, orchestrator: Orchestrator) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let state = Arc::new(AppState::new(orchestrator, shutdown.clone()));
    let app = router::build_router(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    if state.is_running() {
        info!("Waiting for in-flight ingest pass to finish");
    }
    state.wait_idle().await;
    Ok(())
}

async fn run_once(orchestrator: Orchestrator, json: bool) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let report = orchestrator.run(&cancel).await.context("ingest pass failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    bucketlog_core::config::load_dotenv();
    let config = Config::from_env()?;
    config.log_summary();

    let orchestrator = build_orchestrator(&config)?;

    match args.command() {
        Command::Serve => serve(&config, orchestrator).await,
        Command::Run { json } => run_once(orchestrator, json).await,
    }
}
