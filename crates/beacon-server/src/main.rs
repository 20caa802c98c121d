//! Main entry point for the Beacon server.

use std::sync::Arc;

use beacon_persistence::{
    ExternalDbPersistService, MemoryPersistService, PersistenceService, StorageMode,
};
use beacon_release::ReleaseEngine;
use beacon_server::{
    model::{AppState, Configuration},
    startup::{self, GracefulShutdown, ShutdownSignal},
};
use tracing::{error, info};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;
    let _logging_guard = startup::init_logging(&configuration.logging_config())?;

    let storage_mode = configuration.persistence_mode();
    info!("Persistence mode: {}", storage_mode);
    let persistence: Arc<dyn PersistenceService> = match storage_mode {
        StorageMode::ExternalDb => {
            let db = configuration.database_connection().await?;
            Arc::new(ExternalDbPersistService::new(db))
        }
        StorageMode::Memory => Arc::new(MemoryPersistService::new()),
    };
    persistence.health_check().await?;

    let engine =
        Arc::new(ReleaseEngine::bootstrap(persistence, configuration.engine_config()).await?);

    let shutdown_signal = ShutdownSignal::new();
    startup::wait_for_shutdown_signal(shutdown_signal.clone());
    let graceful_shutdown =
        GracefulShutdown::new(shutdown_signal.clone(), configuration.shutdown_timeout());
    let background_tasks = engine.start(shutdown_signal.sender());

    let server_address = configuration.server_address();
    let server_port = configuration.server_port();
    let context_path = configuration.server_context_path();
    let app_state = Arc::new(AppState {
        configuration,
        engine,
    });

    info!("Starting Beacon server on {}:{}", server_address, server_port);
    let server = startup::main_server(app_state, context_path, server_address, server_port)?;
    let server_handle = server.handle();

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("HTTP server error: {}", e);
            }
            shutdown_signal.shutdown();
        }
        _ = graceful_shutdown.wait_for_shutdown() => {
            info!("HTTP server shutting down gracefully");
            server_handle.stop(true).await;
        }
    }

    graceful_shutdown.drain(background_tasks).await;
    info!("Beacon server shutdown complete");
    Ok(())
}
