//! In-memory resource store
//!
//! A versioned key-value store with conditional updates. Every write bumps a
//! global revision; the revision is published on a `tokio::sync::watch`
//! channel so that subscribers are woken level-triggered and re-read whatever
//! state is current.
//!
//! The store is organized into domain-specific modules:
//! - `resources.rs` - managed resources (create/update/delete with preconditions)
//! - `nodes.rs` - nodes
//! - `workloads.rs` - Workload objects, admission and status
//! - `services.rs` - Service objects and status

mod nodes;
mod resources;
mod services;
mod workloads;

use crate::error::StoreError;
use crate::store_trait::{Preconditions, ResourceStore};
use chrono::{DateTime, TimeDelta, Utc};
use crds::{
    LabelSelector, Node, ObjectKey, Resource, Service, ServiceStatus, Workload, WorkloadStatus,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Store contents; guarded by a single mutex that is never held across an await point.
#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) revision: u64,
    pub(crate) resources: BTreeMap<ObjectKey, Resource>,
    pub(crate) nodes: BTreeMap<String, Node>,
    pub(crate) workloads: BTreeMap<ObjectKey, Workload>,
    pub(crate) services: BTreeMap<ObjectKey, Service>,
    last_created_at: Option<DateTime<Utc>>,
}

impl State {
    /// Advance the global revision and return the new value.
    pub(crate) fn bump(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    /// Wall-clock creation time, forced strictly increasing so that
    /// "newest first" orderings are total within one store.
    pub(crate) fn next_creation_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created_at {
            Some(last) if now <= last => last + TimeDelta::nanoseconds(1),
            _ => now,
        };
        self.last_created_at = Some(ts);
        ts
    }
}

/// In-memory implementation of [`ResourceStore`].
///
/// Cloning is cheap and every clone shares the same state and change feed.
#[derive(Clone)]
pub struct InMemoryStore {
    pub(crate) state: Arc<Mutex<State>>,
    revision_tx: Arc<watch::Sender<u64>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("revision", &*self.revision_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store at revision 0
    pub fn new() -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(State::default())),
            revision_tx: Arc::new(revision_tx),
        }
    }

    /// Lock the state. A poisoned lock only means another task panicked
    /// mid-operation; each operation validates before mutating, so the data is usable.
    pub(crate) fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a new revision; never moves the feed backwards.
    pub(crate) fn notify(&self, revision: u64) {
        self.revision_tx.send_if_modified(|current| {
            if revision > *current {
                *current = revision;
                true
            } else {
                false
            }
        });
    }
}

#[async_trait::async_trait]
impl ResourceStore for InMemoryStore {
    fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    fn revision(&self) -> u64 {
        self.state().revision
    }

    // Resource Operations - delegated to resources module
    async fn list_resources(
        &self,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Resource>, StoreError> {
        Ok(resources::list(self, namespace, selector))
    }

    async fn get_resource(&self, namespace: &str, name: &str) -> Result<Resource, StoreError> {
        resources::get(self, namespace, name)
    }

    async fn create_resource(&self, resource: Resource) -> Result<Resource, StoreError> {
        resources::create(self, resource)
    }

    async fn update_resource(&self, resource: Resource) -> Result<Resource, StoreError> {
        resources::update(self, resource)
    }

    async fn delete_resource(
        &self,
        namespace: &str,
        name: &str,
        preconditions: Preconditions,
    ) -> Result<Option<Resource>, StoreError> {
        resources::delete(self, namespace, name, &preconditions)
    }

    // Node Operations - delegated to nodes module
    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        Ok(nodes::list(self))
    }

    async fn put_node(&self, node: Node) -> Result<(), StoreError> {
        nodes::put(self, node);
        Ok(())
    }

    async fn delete_node(&self, name: &str) -> Result<bool, StoreError> {
        Ok(nodes::delete(self, name))
    }

    // Workload Operations - delegated to workloads module
    async fn list_workloads(&self, namespace: Option<&str>) -> Result<Vec<Workload>, StoreError> {
        Ok(workloads::list(self, namespace))
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Workload, StoreError> {
        workloads::get(self, namespace, name)
    }

    async fn create_workload(&self, workload: Workload) -> Result<Workload, StoreError> {
        workloads::create(self, workload)
    }

    async fn update_workload(&self, workload: Workload) -> Result<Workload, StoreError> {
        workloads::update(self, workload)
    }

    async fn update_workload_status(
        &self,
        namespace: &str,
        name: &str,
        status: WorkloadStatus,
    ) -> Result<Workload, StoreError> {
        workloads::update_status(self, namespace, name, status)
    }

    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<bool, StoreError> {
        Ok(workloads::delete(self, namespace, name))
    }

    // Service Operations - delegated to services module
    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>, StoreError> {
        Ok(services::list(self, namespace))
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, StoreError> {
        services::get(self, namespace, name)
    }

    async fn create_service(&self, service: Service) -> Result<Service, StoreError> {
        services::create(self, service)
    }

    async fn update_service(&self, service: Service) -> Result<Service, StoreError> {
        services::update(self, service)
    }

    async fn update_service_status(
        &self,
        namespace: &str,
        name: &str,
        status: ServiceStatus,
    ) -> Result<Service, StoreError> {
        services::update_status(self, namespace, name, status)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<bool, StoreError> {
        Ok(services::delete(self, namespace, name))
    }
}

/// Parse a kube-style string resource version; missing or malformed counts as 0.
pub(crate) fn parse_version(version: Option<&str>) -> u64 {
    version.and_then(|v| v.parse().ok()).unwrap_or(0)
}
