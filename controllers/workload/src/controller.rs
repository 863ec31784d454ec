//! Main controller implementation.
//!
//! The `Controller` supervises one object loop per Workload and per Service.
//! On every store change it lists both kinds, starts loops for new objects,
//! signals removed ones to stop, and restarts loops that exited with an error.
//! Stopping a loop never rolls back a mutation it already issued.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crds::ObjectKey;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A running object loop.
#[derive(Debug)]
struct LoopHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<Result<(), ControllerError>>,
}

impl LoopHandle {
    fn stop(&self) {
        // The loop may already have exited on its own
        let _ = self.stop.send(true);
    }
}

/// Main controller for workload and service loops.
#[derive(Debug)]
pub struct Controller {
    watcher: Watcher,
    namespace: Option<String>,
    ready: Arc<AtomicBool>,
    workload_loops: BTreeMap<ObjectKey, LoopHandle>,
    service_loops: BTreeMap<ObjectKey, LoopHandle>,
}

impl Controller {
    /// Creates a new controller; `namespace` restricts which objects are driven.
    pub fn new(reconciler: Arc<Reconciler>, namespace: Option<String>) -> Self {
        info!("Initializing Workload Controller");
        Self {
            watcher: Watcher::new(reconciler),
            namespace,
            ready: Arc::new(AtomicBool::new(false)),
            workload_loops: BTreeMap::new(),
            service_loops: BTreeMap::new(),
        }
    }

    /// Share a readiness flag, set once the first sync has started every loop.
    #[must_use]
    pub fn with_readiness(mut self, ready: Arc<AtomicBool>) -> Self {
        self.ready = ready;
        self
    }

    pub fn running_workloads(&self) -> Vec<ObjectKey> {
        self.workload_loops.keys().cloned().collect()
    }

    pub fn running_services(&self) -> Vec<ObjectKey> {
        self.service_loops.keys().cloned().collect()
    }

    /// Bring the set of running loops in line with the objects in the store.
    pub async fn sync_loops(&mut self) -> Result<(), ControllerError> {
        let store = self.watcher.reconciler().store();
        let workloads: Vec<ObjectKey> = store
            .list_workloads(self.namespace.as_deref())
            .await?
            .iter()
            .map(crds::Workload::object_key)
            .collect();
        let services: Vec<ObjectKey> = store
            .list_services(self.namespace.as_deref())
            .await?
            .iter()
            .map(crds::Service::object_key)
            .collect();

        let watcher = self.watcher.clone();
        sync_kind("Workload", &mut self.workload_loops, workloads, |key, stop| {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_workload(key, stop).await })
        })
        .await;

        let watcher = self.watcher.clone();
        sync_kind("Service", &mut self.service_loops, services, |key, stop| {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_service(key, stop).await })
        })
        .await;

        Ok(())
    }

    /// Runs the controller until `shutdown` resolves.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ControllerError> {
        info!(
            "Workload Controller running (namespace: {})",
            self.namespace.as_deref().unwrap_or("all namespaces")
        );
        let mut changes = self.watcher.reconciler().store().subscribe();
        tokio::pin!(shutdown);

        let result = loop {
            changes.borrow_and_update();
            if let Err(e) = self.sync_loops().await {
                warn!("Failed to sync object loops (will retry on next change): {}", e);
            } else if !self.ready.swap(true, Ordering::SeqCst) {
                info!(
                    "Controller ready: {} workload loops, {} service loops",
                    self.workload_loops.len(),
                    self.service_loops.len()
                );
            }

            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    break Ok(());
                }
                res = changes.changed() => {
                    if res.is_err() {
                        break Err(ControllerError::Watch("store change feed closed".to_string()));
                    }
                }
            }
        };

        self.shutdown().await;
        result
    }

    /// Stop every loop and wait for it to exit.
    pub async fn shutdown(&mut self) {
        self.ready.store(false, Ordering::SeqCst);
        let loops: Vec<(ObjectKey, LoopHandle)> = std::mem::take(&mut self.workload_loops)
            .into_iter()
            .chain(std::mem::take(&mut self.service_loops))
            .collect();
        for (_, handle) in &loops {
            handle.stop();
        }
        let (keys, tasks): (Vec<ObjectKey>, Vec<_>) =
            loops.into_iter().map(|(key, handle)| (key, handle.task)).unzip();
        for (key, result) in keys.into_iter().zip(join_all(tasks).await) {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Loop for {} exited with error: {}", key, e),
                Err(e) => error!("Loop for {} panicked: {}", key, e),
            }
        }
        info!("All object loops stopped");
    }
}

/// Start, stop and restart the loops of one kind.
async fn sync_kind<S>(
    kind: &str,
    loops: &mut BTreeMap<ObjectKey, LoopHandle>,
    live: Vec<ObjectKey>,
    spawn: S,
) where
    S: Fn(ObjectKey, watch::Receiver<bool>) -> JoinHandle<Result<(), ControllerError>>,
{
    // Reap loops that exited on their own
    let finished: Vec<ObjectKey> = loops
        .iter()
        .filter(|(_, handle)| handle.task.is_finished())
        .map(|(key, _)| key.clone())
        .collect();
    for key in finished {
        if let Some(handle) = loops.remove(&key) {
            match handle.task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("{} loop for {} exited with error: {}", kind, key, e),
                Err(e) => error!("{} loop for {} panicked: {}", kind, key, e),
            }
        }
    }

    let removed: Vec<ObjectKey> = loops
        .keys()
        .filter(|key| !live.contains(key))
        .cloned()
        .collect();
    for key in removed {
        if let Some(handle) = loops.remove(&key) {
            info!("{} {} removed, stopping its loop", kind, key);
            handle.stop();
        }
    }

    for key in live {
        if loops.contains_key(&key) {
            continue;
        }
        info!("Starting loop for {} {}", kind, key);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = spawn(key.clone(), stop_rx);
        loops.insert(key, LoopHandle { stop: stop_tx, task });
    }
}
