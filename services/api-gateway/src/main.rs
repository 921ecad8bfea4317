//! Covenant API Gateway
//!
//! The single HTTP entry point: document uploads and status polling,
//! pipeline re-entry, invoice revalidation and human approval decisions.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use covenant_approval_workflow::EscalationScheduler;
use covenant_utils::{init_logging, AppConfig};

mod app;
mod error;
mod handlers;
mod middleware;
mod routes;

use app::{build_state, create_app, Backends};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration ({}), using defaults", e);
        AppConfig::default()
    });

    init_logging(&config.logging)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting Covenant");

    let backends = Backends::from_config(&config).await?;
    let (state, queue) = build_state(&config, backends)
        .await
        .context("Failed to assemble services")?;

    let recovered = state.coordinator.recover().await?;
    info!(recovered, "Pipeline queue ready");

    let scheduler = EscalationScheduler::from_config(state.approvals.clone()).start();

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "Covenant listening");

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    queue.shutdown().await;
    info!("Covenant stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests;
