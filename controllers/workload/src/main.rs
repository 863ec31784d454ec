//! Workload Controller binary
//!
//! Seeds an in-memory store from an optional YAML manifest, serves probes and
//! metrics, and runs the workload and service loops until Ctrl-C.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use resource_store::InMemoryStore;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use workload_controller::server::{self, ServerState};
use workload_controller::{Controller, ControllerConfig, Manifest, Metrics, Reconciler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Workload Controller");

    let config = ControllerConfig::from_env().context("invalid configuration")?;

    info!("Configuration:");
    info!(
        "  Manifest: {}",
        config
            .manifest_path
            .as_ref()
            .map_or_else(|| "none".to_string(), |p| p.display().to_string())
    );
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Metrics address: {}", config.metrics_addr);
    info!(
        "  Retry: {} attempts, {:?}..{:?}",
        config.retry.max_attempts, config.retry.initial_delay, config.retry.max_delay
    );

    let store = InMemoryStore::new();
    if let Some(path) = &config.manifest_path {
        let manifest = Manifest::load(path)
            .with_context(|| format!("failed to load manifest {}", path.display()))?;
        manifest.apply(&store).await.context("failed to seed store")?;
    } else {
        warn!("No MANIFEST_PATH set, starting with an empty store");
    }

    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
    let ready = Arc::new(AtomicBool::new(false));
    let reconciler = Arc::new(Reconciler::new(store, config.retry.clone(), metrics.clone()));

    let (server_stop, server_stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(server::serve(
        config.metrics_addr,
        ServerState::new(metrics, ready.clone()),
        async move {
            let _ = server_stopped.await;
        },
    ));

    let controller = Controller::new(reconciler, config.namespace.clone()).with_readiness(ready);
    let result = controller
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await;

    let _ = server_stop.send(());
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP server failed: {}", e),
        Err(e) => error!("HTTP server task panicked: {}", e),
    }

    result.context("controller stopped with an error")?;
    info!("Workload Controller stopped");
    Ok(())
}
