//! SplitLedger API Server Binary
//!
//! Starts the HTTP API for the shared bill ledger and relays committed
//! changes from PostgreSQL to the in-process change stream, which keeps the
//! participants' live ledgers current.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin splitledger-api
//!
//! # Run with environment variables
//! API_HOST=0.0.0.0 API_PORT=8080 API_DATABASE_URL=postgres://... cargo run --bin splitledger-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_SESSION_DIR` - Root directory for creation sessions (default: ./data/sessions)
//! * `API_SESSION_MAX_AGE_HOURS` - Session recovery window (default: 24)
//! * `API_AUTO_DISMISS_LOW_SEVERITY` - Commit low-severity conflicts without asking (default: false)
//! * `API_PENDING_CONFLICT_TTL_MINUTES` - Lifetime of an unresolved conflict (default: 1440)
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::SystemClock;
use infra_db::{create_pool, run_migrations, PostgresBillStore};
use interface_api::{config::ApiConfig, create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = load_config();
    init_tracing(&config.log_level);
    config.validate()?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "Starting SplitLedger API Server"
    );

    let pool = create_pool(config.database_config())
        .await
        .context("connecting to database")?;
    run_migrations(&pool).await.context("running migrations")?;

    let store = Arc::new(PostgresBillStore::with_capacity(
        pool,
        config.change_channel_capacity,
    ));

    // Relay committed changes until shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = {
        let store = store.clone();
        tokio::spawn(async move { store.follow_changes(shutdown_rx).await })
    };

    let state = AppState::new(store, Arc::new(SystemClock), config.clone());
    let ledgers = state.ledgers.clone();
    let app = create_router(state);

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("invalid server address {}", config.server_addr()))?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ledgers.shutdown().await;
    let _ = shutdown_tx.send(true);
    match relay.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Change relay stopped with an error"),
        Err(e) => tracing::warn!(error = %e, "Change relay task panicked"),
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Loads API configuration from `API_*` variables, falling back to defaults
fn load_config() -> ApiConfig {
    ApiConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Failed to read API_* configuration ({e}), using defaults");
        ApiConfig::default()
    })
}

/// Initializes the tracing subscriber for structured logging.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// In-flight requests complete before the process exits.
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
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
