//! Per-object reconcile loops.
//!
//! Every Workload and every Service gets its own task. A task subscribes to the
//! store's revision feed and, whenever the revision moves, re-reads its object
//! and reconciles the latest state. Intermediate revisions are never replayed:
//! the loops are level-triggered.
//!
//! All loops share the generic `run_object_loop()` helper, which owns the wake
//! up, requeue and stop handling. Whichever way a loop ends, its backoff entry
//! and per-object metric series are dropped.

use crate::error::ControllerError;
use crate::reconciler::{Action, Reconciler};
use crds::ObjectKey;
use resource_store::StoreError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Boxed reconcile pass. Resolves to `None` once the object no longer exists.
pub type ReconcileFuture = Pin<Box<dyn Future<Output = Result<Option<Action>, ControllerError>> + Send>>;

/// Drops per-object metric series once a loop ends.
type ForgetFn = fn(&Reconciler, &ObjectKey);

/// Generic object loop.
///
/// Runs until the object disappears, the stop signal fires (or its sender is
/// dropped), or the change feed closes. `forget_fn` runs on every exit.
async fn run_object_loop<F>(
    kind: &'static str,
    key: ObjectKey,
    reconciler: Arc<Reconciler>,
    stop: watch::Receiver<bool>,
    reconcile_fn: F,
    forget_fn: ForgetFn,
) -> Result<(), ControllerError>
where
    F: Fn(Arc<Reconciler>, ObjectKey) -> ReconcileFuture + Send + Sync + 'static,
{
    info!("Starting {} loop for {}", kind, key);
    let backoff_key = format!("{kind}/{key}");

    let result = drive_object(kind, &key, &backoff_key, &reconciler, stop, reconcile_fn).await;

    reconciler.forget(&backoff_key);
    forget_fn(&reconciler, &key);
    debug!("{} loop for {} stopped", kind, key);
    result
}

async fn drive_object<F>(
    kind: &'static str,
    key: &ObjectKey,
    backoff_key: &str,
    reconciler: &Arc<Reconciler>,
    mut stop: watch::Receiver<bool>,
    reconcile_fn: F,
) -> Result<(), ControllerError>
where
    F: Fn(Arc<Reconciler>, ObjectKey) -> ReconcileFuture + Send + Sync + 'static,
{
    let mut changes = reconciler.store().subscribe();

    loop {
        if *stop.borrow() {
            break;
        }
        // Anything written from here on triggers another pass
        changes.borrow_and_update();

        let action = match reconcile_fn(reconciler.clone(), key.clone()).await {
            Ok(Some(action)) => {
                reconciler.reset_error(backoff_key);
                action
            }
            Ok(None) => {
                info!("{} {} is gone, stopping its loop", kind, key);
                return Ok(());
            }
            Err(e) => {
                reconciler.increment_error(backoff_key);
                let (delay, error_count) = reconciler.get_backoff_for_object(backoff_key);
                if e.is_transient() {
                    debug!(
                        "{} {} failed transiently (errors: {}), requeue in {:?}: {}",
                        kind, key, error_count, delay, e
                    );
                } else {
                    error!(
                        "Reconciliation failed for {} {} (errors: {}), requeue in {:?}: {}",
                        kind, key, error_count, delay, e
                    );
                }
                Action::requeue(delay)
            }
        };

        let requeue = async {
            match action.requeue_after() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            res = stop.changed() => {
                if res.is_err() || *stop.borrow() {
                    break;
                }
            }
            res = changes.changed() => {
                if res.is_err() {
                    return Err(ControllerError::Watch(format!("change feed closed for {kind} {key}")));
                }
            }
            () = requeue => {}
        }
    }

    Ok(())
}

/// Starts object loops against a shared reconciler.
#[derive(Debug, Clone)]
pub struct Watcher {
    reconciler: Arc<Reconciler>,
}

impl Watcher {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Drive one Workload until it is deleted or `stop` fires.
    pub async fn watch_workload(
        &self,
        key: ObjectKey,
        stop: watch::Receiver<bool>,
    ) -> Result<(), ControllerError> {
        let reconcile = |reconciler: Arc<Reconciler>, key: ObjectKey| -> ReconcileFuture {
            Box::pin(async move {
                let workload = match reconciler.store().get_workload(&key.namespace, &key.name).await {
                    Ok(workload) => workload,
                    Err(StoreError::NotFound(_)) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                reconciler.reconcile_workload(&workload).await.map(Some)
            })
        };
        let forget: ForgetFn = |reconciler, key| reconciler.metrics().forget_workload(&key.namespace, &key.name);
        run_object_loop("Workload", key, self.reconciler.clone(), stop, reconcile, forget).await
    }

    /// Drive one Service until it is deleted or `stop` fires.
    pub async fn watch_service(
        &self,
        key: ObjectKey,
        stop: watch::Receiver<bool>,
    ) -> Result<(), ControllerError> {
        let reconcile = |reconciler: Arc<Reconciler>, key: ObjectKey| -> ReconcileFuture {
            Box::pin(async move {
                let service = match reconciler.store().get_service(&key.namespace, &key.name).await {
                    Ok(service) => service,
                    Err(StoreError::NotFound(_)) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                reconciler.reconcile_service(&service).await.map(Some)
            })
        };
        let forget: ForgetFn = |reconciler, key| reconciler.metrics().forget_service(&key.namespace, &key.name);
        run_object_loop("Service", key, self.reconciler.clone(), stop, reconcile, forget).await
    }
}
