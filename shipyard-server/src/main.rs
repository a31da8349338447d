//! Shipyard
//!
//! A self-hosted continuous-deployment server. Developers push to the
//! embedded git endpoint; every push is built, tested and started on a
//! fresh port, and the public listener switches to the new release once
//! it accepts connections.
//!
//! Architecture:
//! - Webhook: smart-HTTP git endpoints raising triggers on push
//! - Workflows: trigger, deploy and release tasks connected by channels
//! - State: in-memory history of every version, served by the status API
//! - Proxy: forwards public traffic to the live release

mod api;
mod app;
mod auth;
mod config;
mod exec;
mod git;
mod notifier;
mod port;
mod proxy;
mod state;
mod store;
mod upstream;
mod version;
mod webhook;
mod workflow;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shipyard_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_ansi(config.main.color))
        .init();

    info!("Starting Shipyard {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Repository {} on {}, releases on ports {}-{}",
        config.main.repository,
        config.main.head,
        config.release.port_range.min,
        config.release.port_range.max
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    if let Err(e) = app::run(config, cancel).await {
        error!("Shipyard stopped: {:#}", e);
        return Err(e);
    }

    info!("Shipyard stopped");
    Ok(())
}

/// Loads configuration from the environment and validates it
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Cancels `cancel` on Ctrl-C or SIGTERM
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown requested");
    cancel.cancel();
}
