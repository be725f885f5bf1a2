mod api;
mod config;
mod detector;
mod error;
mod fetcher;
mod handle;
mod indices;
mod scans;
mod scheduler;
mod scorer;
mod state;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::routes::router;
use crate::config::Config;
use crate::detector::TerminalBell;
use crate::error::Result;
use crate::fetcher::{ChartinkSession, QuerySession};
use crate::handle::ScannerHandle;
use crate::indices::IndexFeed;
use crate::scans::load_catalog;
use crate::scheduler::Scheduler;
use crate::state::SettingsStore;
use crate::types::Settings;

/// How long a cycle in flight may take to finish after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Scan catalog + settings ---
    let catalog = load_catalog(cfg.scan_catalog_path.as_deref())?;
    info!("Scan catalog ready: {} scans", catalog.len());

    let settings = SettingsStore::open(cfg.settings_path.clone(), Settings::defaults(&catalog)).await;

    // --- Core ---
    let handle = ScannerHandle::new(
        catalog,
        settings,
        cfg.alert,
        Arc::new(TerminalBell),
        cfg.scheduler,
        cfg.suggestion_price_ceiling,
    )
    .with_index_feed(IndexFeed::new(&cfg.indices_base_url, cfg.request_timeout)?);

    let session = QuerySession::new(ChartinkSession::new(&cfg.screener_url, cfg.request_timeout)?);
    let scheduler = Scheduler::new(session, handle.clone());
    let scheduler_task = scheduler.start();

    // --- HTTP API ---
    let app = router(handle);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Shutdown ---
    scheduler.stop();
    if let Some(mut task) = scheduler_task {
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Scheduler task ended abnormally: {e}"),
            Err(_) => {
                warn!("Scheduler did not stop within {}s; aborting", SHUTDOWN_GRACE.as_secs());
                task.abort();
            }
        }
    }
    info!(scheduler = ?scheduler.state(), "Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
