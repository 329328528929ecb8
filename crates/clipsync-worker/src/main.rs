//! Clipsync daemon: prepares the event ledger and the storage backend, uploads
//! the clips of events piped in on stdin (one JSON event per line) and runs
//! the maintenance jobs until it is asked to stop. Without `FRIGATE_URL` only
//! maintenance runs.
//!
//! Configuration comes from the environment (and `.env`); see `clipsync_core::Config`.

use anyhow::Context;
use clipsync_core::{AppError, Config};
use clipsync_db::EventRepository;
use clipsync_storage::create_storage;
use clipsync_worker::{
    init_tracing, run_event_feed, stdin_lines, EventHandler, Maintenance, MaintenanceConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.log_level).map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        backend = %config.storage_backend,
        upload_dir = %config.upload_dir,
        timezone = %config.timezone,
        "Starting Clipsync"
    );

    let pool = clipsync_db::connect(&config.database_url)
        .await
        .context("Failed to open event ledger")?;
    let events = EventRepository::new(pool);
    events
        .run_migrations()
        .await
        .context("Failed to migrate event ledger")?;

    let storage = create_storage(&config).context("Failed to create storage backend")?;

    let feed = match EventHandler::from_config(events.clone(), storage.clone(), &config) {
        Ok(handler) => {
            let lines = stdin_lines();
            Some(tokio::spawn(async move {
                run_event_feed(&handler, lines).await;
            }))
        }
        Err(AppError::Config(reason)) => {
            tracing::warn!(reason = %reason, "Event feed disabled");
            None
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Failed to set up event handling")),
    };

    let maintenance = Maintenance::start(
        events,
        storage,
        MaintenanceConfig::from_config(&config),
    );

    shutdown_signal().await;
    if let Some(feed) = feed {
        feed.abort();
    }
    maintenance.shutdown().await;

    tracing::info!("Clipsync stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }
}
