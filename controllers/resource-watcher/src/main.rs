//! Skyflo Resource Watcher
//!
//! Mirrors the state of a Kubernetes cluster to the Skyflo collector:
//! - crawls Nodes, Namespaces, Ingresses, Services, Deployments, StatefulSets,
//!   Pods, ConfigMaps and Secrets once, sending one `INITIAL` event per kind
//! - then watches every kind and forwards each add, update and delete
//!
//! Liveness and readiness are exposed on the probe server.

mod adapter;
mod config;
mod diagnostics;
mod error;
mod events;
mod health;
mod probe;
mod synchronizer;
#[cfg(test)]
mod test_utils;

use crate::adapter::KubeAdapter;
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::error::SyncError;
use crate::synchronizer::Synchronizer;
use anyhow::{Context, Result};
use collector_client::CollectorClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Configure rustls crypto provider before any TLS client is built
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Skyflo Resource Watcher");

    let config = Config::from_env()?;
    let probe_addr = config.probe_addr()?;

    info!("Configuration:");
    info!("  Cluster: {}", config.kubernetes.cluster_name);
    info!("  Collector: {}", config.api.server);
    info!("  Probe address: {}", probe_addr);
    info!("  Cache sync timeout: {:?}", config.kubernetes.cache_sync_timeout);
    info!("  Poll interval (unused, push-driven): {:?}", config.kubernetes.poll_interval);

    let adapter = KubeAdapter::try_default()
        .await
        .map_err(SyncError::AdapterConnection)?;
    let sender = CollectorClient::new(
        config.api.server.clone(),
        config.api.key.clone(),
        config.server.timeout,
    )
    .context("failed to build collector client")?;

    let diagnostics = Diagnostics::new().context("failed to create metrics registry")?;

    let synchronizer = Arc::new(Synchronizer::new(
        Arc::new(adapter),
        Arc::new(sender),
        config.kubernetes.cluster_name.clone(),
        config.kubernetes.cache_sync_timeout,
        Arc::new(diagnostics),
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let probe = tokio::spawn(probe::serve(
        probe_addr,
        Arc::clone(&synchronizer),
        shutdown.clone(),
    ));

    let reason = synchronizer.run(shutdown.clone()).await;
    let requested = shutdown.is_cancelled();
    shutdown.cancel();

    match probe.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Probe server failed"),
        Err(e) => warn!(error = %e, "Probe server task failed"),
    }

    stop_outcome(reason, requested)?;
    info!("Resource watcher stopped");
    Ok(())
}

/// A run always ends with a reason. Only a cancellation we asked for is a clean exit.
fn stop_outcome(reason: SyncError, shutdown_requested: bool) -> Result<(), SyncError> {
    match reason {
        SyncError::Cancelled if shutdown_requested => Ok(()),
        reason => Err(reason),
    }
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}
