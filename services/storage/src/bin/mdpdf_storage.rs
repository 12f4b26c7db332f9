//! services/storage/src/bin/mdpdf_storage.rs
//!
//! Runs session-storage maintenance: prepares the workspaces root, clears a
//! legacy root if configured, and keeps the expiry sweeper running until the
//! process receives Ctrl-C.

use std::sync::Arc;

use storage_lib::{
    config::Config, error::ServiceError, maintenance::migrate_legacy_root, ExpirySweeper,
    SessionStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting storage service...");

    // --- 2. Prepare the Workspaces Root ---
    let store = SessionStore::from_config(&config)?;
    info!("Workspaces root: {}", store.root().display());

    // --- 3. One-time Legacy Cleanup ---
    if let Some(legacy_root) = &config.legacy_workspaces_root {
        match migrate_legacy_root(legacy_root, store.root()) {
            Ok(deleted) => info!("Legacy cleanup complete ({} removed).", deleted),
            Err(e) => warn!("Legacy cleanup failed: {}", e),
        }
    }

    // --- 4. Start the Expiry Sweeper ---
    let shutdown = CancellationToken::new();
    let sweeper = ExpirySweeper::from_config(store.root().to_path_buf(), &config);
    match config.ttl_seconds() {
        Some(ttl) => info!("Sessions expire after {}s idle.", ttl),
        None => info!("Session expiry is disabled."),
    }
    let sweeper_handle = sweeper.spawn(shutdown.clone());

    // --- 5. Wait for Shutdown ---
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Stopping sweeper...");
    shutdown.cancel();
    sweeper_handle
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?;

    info!("Storage service stopped.");
    Ok(())
}
