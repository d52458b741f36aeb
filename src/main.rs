use std::net::SocketAddr;

use anyhow::Result;
use tokio::signal;

use issue_tracker::config::{AppConfig, DatabaseBackend};
use issue_tracker::services::database::Database;
use issue_tracker::services::repository::Repositories;
use issue_tracker::utils::logging::init_logging;
use issue_tracker::{build_router, AppState};

/// Graceful shutdown signal handler
///
/// Resolves on Ctrl+C or SIGTERM so in-flight requests can complete
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::load()?;
    init_logging(&config.logger.level)?;

    let repositories = match config.database.backend {
        DatabaseBackend::Mongo => {
            let database = Database::new(&config.database.url, &config.database.name).await?;
            database.ensure_indexes().await?;
            Repositories::mongo(&database)
        }
        DatabaseBackend::Memory => {
            tracing::warn!("Using the in-memory backend, nothing will be persisted");
            Repositories::memory()
        }
    };

    let addr = SocketAddr::from((config.server.host.parse::<std::net::IpAddr>()?, config.server.port));
    let defaults = config.auth.default_users.clone();

    let state = AppState::new(config, repositories)?;
    let created = state.users.ensure_default_users(&defaults).await?;
    if created > 0 {
        tracing::info!("Created {} default user(s)", created);
    }

    let app = build_router(state)?;

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
