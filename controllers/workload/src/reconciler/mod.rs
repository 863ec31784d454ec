//! Reconciliation logic.
//!
//! - `workload`: drives owned resources towards the workload's desired cardinality
//! - `endpoints`: projects a service's selector onto the current resource set
//!
//! The two never share a pass: a workload reconcile does not look at services,
//! and a service reconcile only reads resources.

pub mod endpoints;
pub mod workload;


use crate::backoff::FibonacciBackoff;
use crate::metrics::Metrics;
use crate::retry::RetryPolicy;
use resource_store::ResourceStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// What the object loop should do after a reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    requeue_after: Option<Duration>,
}

impl Action {
    /// Sleep until the store changes.
    pub fn await_change() -> Self {
        Self { requeue_after: None }
    }

    /// Run again after `delay` even if nothing changes.
    pub fn requeue(delay: Duration) -> Self {
        Self {
            requeue_after: Some(delay),
        }
    }

    pub fn requeue_after(&self) -> Option<Duration> {
        self.requeue_after
    }
}

/// Backoff state for an object
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new(min: Duration, max: Duration) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min, max),
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Reconciles workloads and services against the resource store.
pub struct Reconciler {
    pub(crate) store: Box<dyn ResourceStore>,
    pub(crate) retry: RetryPolicy,
    pub(crate) metrics: Arc<Metrics>,
    /// Error count tracking per object (kind/namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        store: impl ResourceStore + 'static,
        retry: RetryPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store: Box::new(store),
            retry,
            metrics,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &dyn ResourceStore {
        self.store.as_ref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get the requeue delay for an object based on its error count
    ///
    /// Returns (delay, error_count)
    pub fn get_backoff_for_object(&self, object_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(object_key.to_string()).or_insert_with(|| {
                    BackoffState::new(self.retry.initial_delay, self.retry.max_delay)
                });
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (self.retry.max_delay, 0)
            }
        }
    }

    /// Increment error count for an object
    pub fn increment_error(&self, object_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(object_key.to_string())
                .or_insert_with(|| BackoffState::new(self.retry.initial_delay, self.retry.max_delay))
                .increment_error();
        }
    }

    /// Reset error count for an object (on successful reconciliation)
    pub fn reset_error(&self, object_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(object_key) {
                state.reset();
            }
        }
    }

    /// Forget an object's backoff once its loop has stopped.
    pub fn forget(&self, object_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(object_key);
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_backoffs(&self) -> usize {
        self.backoff_states.lock().map(|states| states.len()).unwrap_or_default()
    }
}
