//! # Auth Gateway - Main Entry Point
//!
//! Bootstraps the gateway: initializes logging, loads the YAML configuration,
//! builds the server (which validates clients, authorizers, and rules), and
//! serves until interrupted.

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};

use auth_gateway::{GatewayConfig, GatewayServer};

/// Config file location: first CLI argument, then the environment, then the
/// conventional default.
fn config_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("GATEWAY_CONFIG").ok())
        .unwrap_or_else(|| "config/gateway.yaml".to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("Starting auth gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let path = config_path();
    let config = GatewayConfig::from_yaml_file(&path)
        .with_context(|| format!("failed to load configuration from {path}"))?;

    let server = match GatewayServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            // Misconfiguration (unknown client or authorizer in a rule,
            // duplicate names) is fatal at startup, never per request.
            error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = server.run() => {
            result.context("server terminated with an error")?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    info!("auth gateway shutdown complete");
    Ok(())
}

/// Initialize tracing with an env-filter, defaulting to info level
fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_gateway=info,tower_http=info".into()),
        )
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
