//! Multipart Relay Server
//!
//! Accepts multipart uploads over HTTP and relays the parts to an
//! S3-compatible bucket.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multipart_relay::config::Config;
use multipart_relay::routes;
use multipart_relay::state::AppState;
use multipart_relay::storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "multipart_relay=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting Multipart Relay v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Storage provider: {:?}", config.storage.provider);
    tracing::info!("S3 bucket: {}", config.storage.bucket);
    if let Some(endpoint) = &config.storage.endpoint {
        tracing::info!("S3 endpoint: {}", endpoint);
    }
    tracing::info!("Completion policy: {:?}", config.upload.completion_policy);

    let store = storage::connect(&config.storage).await;
    let app_state = AppState::new(config.clone(), store);

    match config.upload.session_ttl {
        Some(ttl) => {
            tracing::info!(
                "Expiring upload sessions after {:?}, sweeping every {:?}",
                ttl,
                config.upload.sweep_interval
            );
            app_state
                .orchestrator()
                .clone()
                .start_reaper_task(ttl, config.upload.sweep_interval);
        }
        None => {
            tracing::info!("Upload session expiry disabled; abandoned sessions are kept until restart");
        }
    }

    let app = routes::app(app_state);

    // Start server with graceful shutdown
    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid SERVER_HOST {}", config.server.host))?;
    let addr = SocketAddr::new(host, config.server.port);
    tracing::info!("Multipart Relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
