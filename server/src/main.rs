//! Chatter Server - Main entry point.
//!
//! This binary starts the chat relay with:
//! - Structured JSON logging
//! - `.env` loading for local development
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//!
//! # Configuration
//!
//! See [`chatter_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! # In-memory store
//! JWT_SECRET="dev-secret" cargo run --bin chatter-server
//!
//! # SQLite store
//! JWT_SECRET="dev-secret" \
//! DATABASE_URL="sqlite:chat.db" \
//! PORT=8080 \
//! cargo run --release --bin chatter-server
//! ```

use std::process::ExitCode;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use chatter_server::config::Config;
use chatter_server::routes::{create_router, AppState};
use chatter_server::store::Stores;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; real deployments set the environment.
    let dotenv = dotenvy::dotenv();

    init_logging();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables:");
            eprintln!("  JWT_SECRET   - HS256 secret shared with the token issuer");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  DATABASE_URL - SQLite URL, e.g. sqlite:chat.db (default: in-memory)");
            eprintln!("  PORT         - HTTP server port (default: 3000)");
            eprintln!("  RUST_LOG     - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    info!(
        port = config.port,
        persistent = config.database_url.is_some(),
        "Chatter server starting"
    );

    let stores = match Stores::connect(config.database_url.as_deref()).await {
        Ok(stores) => stores,
        Err(err) => {
            error!(error = %err, "Failed to open document store");
            return ExitCode::from(1);
        }
    };

    let port = config.port;
    let app = create_router(AppState::new(&config, stores));

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => {
            info!(port, address = %bind_addr, "Server listening");
            listener
        }
        Err(err) => {
            error!(error = %err, address = %bind_addr, "Failed to bind to address");
            return ExitCode::from(1);
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    info!("Server ready to accept connections");

    if let Err(err) = server.await {
        error!(error = %err, "Server error");
        return ExitCode::from(1);
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Initialize structured JSON logging.
///
/// `RUST_LOG` overrides the default filter.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
