//! Application entry point and server initialization
//!
//! This module contains the main function that:
//! - Loads environment configuration
//! - Opens the link registry
//! - Starts the enrichment workers
//! - Starts the HTTP server with graceful shutdown support

use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use urlshortener::config::Config;
use urlshortener::database::Registry;
use urlshortener::qr::PngQrEncoder;
use urlshortener::reachability::HttpProber;
use urlshortener::route::create_app;
use urlshortener::safety::{BlocklistOracle, SafeBrowsingOracle, SafetyOracle};
use urlshortener::state::AppState;
use urlshortener::worker::start_background_tasks;

/// Application entry point
///
/// The runtime is built by hand so the worker pool size comes from the
/// configuration (`WORKER_THREADS`).
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if it exists
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("urlshortener=debug,tower_http=debug")),
        )
        .init();

    let config = Config::from_env();

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Registry::open(&config.database_url)?;

    let prober = Arc::new(HttpProber::new(config.probe_timeout)?);
    let encoder = Arc::new(PngQrEncoder::default());
    let oracle: Arc<dyn SafetyOracle> = match &config.safe_browsing_key {
        Some(key) => Arc::new(SafeBrowsingOracle::new(key.clone(), config.probe_timeout)?),
        None => {
            warn!("SAFE_BROWSING_KEY not set, classifying with the host blocklist only");
            Arc::new(BlocklistOracle::new(config.safety_blocklist.clone()))
        }
    };

    let port = config.port;
    let db_name = config.database_url.clone();
    let (state, requests) = AppState::new(config, registry, prober, encoder);
    let workers = start_background_tasks(&state, requests, oracle);

    let app = create_app(state).layer(TraceLayer::new_for_http());

    // Bind to all network interfaces on the specified port
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running at http://localhost:{}", port);
    info!("Using database: {}", db_name);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for worker in workers {
        worker.abort();
    }
    info!("background workers stopped");

    Ok(())
}

/// Waits for SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    // On non-Unix systems (Windows), only handle Ctrl+C
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server.");
}
