//! Background worker: consumes signing results and drains the vote queue.
//!
//! Runs against in-process collaborators (bus, credential issuer, token verifier), so it is
//! suited to local runs and smoke tests of the storage and config stack.

use log::{info, warn};
use skus_core::application::{run_store_signed_order_credentials, run_vote_drain_loop, SkusContext};
use skus_core::infrastructure::auth::StaticAuthTokenVerifier;
use skus_core::infrastructure::bus::MemoryBus;
use skus_core::infrastructure::config::{load_app_config, load_app_config_with_profile};
use skus_core::infrastructure::logging::init_logger;
use skus_core::infrastructure::rpc::MemoryCredentialIssuer;
use skus_core::infrastructure::storage::{RocksStorage, Storage};
use skus_core::SkusError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const PROFILE_ENV: &str = "SKUS_PROFILE";
const VOTE_DRAIN_IDLE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let app_config = match std::env::var(PROFILE_ENV) {
        Ok(profile) if !profile.trim().is_empty() => load_app_config_with_profile(profile.trim())?,
        _ => load_app_config()?,
    };
    init_logger(app_config.logging.dir.as_deref(), &app_config.logging.filters)?;
    info!(
        "skus-worker starting environment={} merchant_id={} data_dir={}",
        app_config.service.environment, app_config.service.merchant_id, app_config.service.data_dir
    );

    let storage = RocksStorage::open_with_options(
        std::path::Path::new(&app_config.service.data_dir).join("skus"),
        app_config.service.allow_schema_wipe,
    )?;
    storage.health_check()?;
    let storage: Arc<dyn Storage> = Arc::new(storage);
    info!("storage initialized data_dir={}", app_config.service.data_dir);

    let ctx = SkusContext::new(
        app_config,
        storage,
        Arc::new(MemoryCredentialIssuer::new()),
        Arc::new(MemoryBus::new()),
        Arc::new(StaticAuthTokenVerifier::new()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = tokio::spawn(run_store_signed_order_credentials(ctx.clone(), shutdown_rx.clone()));
    let drain = tokio::spawn(run_vote_drain_loop(ctx, shutdown_rx, VOTE_DRAIN_IDLE));

    tokio::signal::ctrl_c().await.map_err(|err| SkusError::Message(err.to_string()))?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    match consumer.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("signed order credentials consumer error: {}", err),
        Err(err) => warn!("signed order credentials consumer panicked: {}", err),
    }
    if let Err(err) = drain.await {
        warn!("vote drain loop panicked: {}", err);
    }
    info!("skus-worker stopped");
    Ok(())
}
