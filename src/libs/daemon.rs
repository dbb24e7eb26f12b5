//! Service run loop with signal handling.
//!
//! Runs the startup backfill, starts the scheduler loops and waits for a
//! termination signal. Reconcilers are restartable and idempotent, so an
//! abort between passes loses nothing; in-flight transactions roll back.

use crate::api::AttendanceApi;
use crate::libs::scheduler::Scheduler;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Runs the service until SIGTERM/SIGINT (Ctrl-C on non-Unix).
pub async fn run(api: Arc<AttendanceApi>) -> Result<()> {
    let backfilled = api.startup_backfill()?;
    info!(backfilled, "startup backfill complete");

    let scheduler = Scheduler::new(api);
    let handles = scheduler.spawn();
    info!("scheduler started");

    wait_for_shutdown().await;

    for handle in &handles {
        handle.abort();
    }
    info!("shutting down");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
    } else {
        info!("received Ctrl-C");
    }
}
