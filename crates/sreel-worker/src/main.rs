//! Video generation worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sreel_worker::{recover_incomplete_jobs, ProcessingContext, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env().add_directive("sreel=info".parse().unwrap()),
        )
        .init();

    info!("Starting sreel-worker");

    let config = WorkerConfig::from_env();
    info!(root = %config.root.display(), "Worker config loaded");

    let ctx = match ProcessingContext::new(config) {
        Ok(ctx) => Arc::new(ctx),
        Err(err) => {
            error!("Failed to initialize processing context: {err}");
            std::process::exit(1);
        }
    };

    // Resume whatever a previous process left unfinished.
    match recover_incomplete_jobs(&ctx) {
        Ok(0) => info!("No interrupted jobs to recover"),
        Ok(count) => info!(count, "Recovering interrupted jobs"),
        Err(err) => error!("Startup recovery failed: {err}"),
    }

    // Jobs arrive through the job store; keep serving until signalled.
    tokio::signal::ctrl_c().await.ok();
    info!("Shutdown signal received");

    info!("Worker shutdown complete");
}
