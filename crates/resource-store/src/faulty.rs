//! Fault-injecting store wrapper for tests
//!
//! Wraps any [`ResourceStore`] and fails scripted calls. Faults are consumed in
//! FIFO order per operation; once the script for an operation is empty, calls
//! pass straight through.

use crate::error::StoreError;
use crate::store_trait::{Preconditions, ResourceStore};
use crds::{LabelSelector, Node, Resource, Service, ServiceStatus, Workload, WorkloadStatus};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Write operations that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateResource,
    UpdateResource,
    DeleteResource,
    UpdateWorkloadStatus,
    UpdateServiceStatus,
}

/// How a scripted call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Rejected with `Throttled`, not applied
    Throttle,
    /// Rejected with `Timeout`, not applied
    Timeout,
    /// Rejected with `Conflict`, not applied
    Conflict,
    /// Applied, but the caller sees `Timeout`
    LostAck,
}

#[derive(Debug, Default)]
struct Script {
    faults: HashMap<Operation, VecDeque<FaultKind>>,
    calls: HashMap<Operation, usize>,
}

/// Store wrapper that injects scripted failures into write operations.
#[derive(Debug, Clone)]
pub struct FaultyStore<S> {
    inner: S,
    script: Arc<Mutex<Script>>,
}

impl<S: ResourceStore> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    /// The wrapped store, for assertions that must bypass fault injection.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail the next `times` calls of `op` with `kind`.
    pub fn inject(&self, op: Operation, kind: FaultKind, times: usize) {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        script
            .faults
            .entry(op)
            .or_default()
            .extend(std::iter::repeat_n(kind, times));
    }

    /// Number of calls of `op` seen so far, failed or not.
    pub fn calls(&self, op: Operation) -> usize {
        let script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        script.calls.get(&op).copied().unwrap_or(0)
    }

    /// Faults still queued for `op`.
    pub fn pending(&self, op: Operation) -> usize {
        let script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        script.faults.get(&op).map_or(0, VecDeque::len)
    }

    fn next_fault(&self, op: Operation) -> Option<FaultKind> {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        *script.calls.entry(op).or_insert(0) += 1;
        script.faults.get_mut(&op).and_then(VecDeque::pop_front)
    }

    /// Run `call` under the fault script for `op`.
    async fn guarded<T, F>(&self, op: Operation, key: String, call: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        match self.next_fault(op) {
            None => call.await,
            Some(FaultKind::Throttle) => Err(StoreError::Throttled(key)),
            Some(FaultKind::Timeout) => Err(StoreError::Timeout(key)),
            Some(FaultKind::Conflict) => Err(StoreError::Conflict {
                key,
                expected: 0,
                actual: self.inner.revision(),
            }),
            Some(FaultKind::LostAck) => {
                call.await?;
                Err(StoreError::Timeout(key))
            }
        }
    }
}

#[async_trait::async_trait]
impl<S: ResourceStore> ResourceStore for FaultyStore<S> {
    fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.subscribe()
    }

    fn revision(&self) -> u64 {
        self.inner.revision()
    }

    async fn list_resources(
        &self,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Resource>, StoreError> {
        self.inner.list_resources(namespace, selector).await
    }

    async fn get_resource(&self, namespace: &str, name: &str) -> Result<Resource, StoreError> {
        self.inner.get_resource(namespace, name).await
    }

    async fn create_resource(&self, resource: Resource) -> Result<Resource, StoreError> {
        let key = resource.key().to_string();
        self.guarded(Operation::CreateResource, key, self.inner.create_resource(resource))
            .await
    }

    async fn update_resource(&self, resource: Resource) -> Result<Resource, StoreError> {
        let key = resource.key().to_string();
        self.guarded(Operation::UpdateResource, key, self.inner.update_resource(resource))
            .await
    }

    async fn delete_resource(
        &self,
        namespace: &str,
        name: &str,
        preconditions: Preconditions,
    ) -> Result<Option<Resource>, StoreError> {
        let key = format!("{namespace}/{name}");
        self.guarded(
            Operation::DeleteResource,
            key,
            self.inner.delete_resource(namespace, name, preconditions),
        )
        .await
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        self.inner.list_nodes().await
    }

    async fn put_node(&self, node: Node) -> Result<(), StoreError> {
        self.inner.put_node(node).await
    }

    async fn delete_node(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.delete_node(name).await
    }

    async fn list_workloads(&self, namespace: Option<&str>) -> Result<Vec<Workload>, StoreError> {
        self.inner.list_workloads(namespace).await
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Workload, StoreError> {
        self.inner.get_workload(namespace, name).await
    }

    async fn create_workload(&self, workload: Workload) -> Result<Workload, StoreError> {
        self.inner.create_workload(workload).await
    }

    async fn update_workload(&self, workload: Workload) -> Result<Workload, StoreError> {
        self.inner.update_workload(workload).await
    }

    async fn update_workload_status(
        &self,
        namespace: &str,
        name: &str,
        status: WorkloadStatus,
    ) -> Result<Workload, StoreError> {
        let key = format!("{namespace}/{name}");
        self.guarded(
            Operation::UpdateWorkloadStatus,
            key,
            self.inner.update_workload_status(namespace, name, status),
        )
        .await
    }

    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<bool, StoreError> {
        self.inner.delete_workload(namespace, name).await
    }

    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>, StoreError> {
        self.inner.list_services(namespace).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, StoreError> {
        self.inner.get_service(namespace, name).await
    }

    async fn create_service(&self, service: Service) -> Result<Service, StoreError> {
        self.inner.create_service(service).await
    }

    async fn update_service(&self, service: Service) -> Result<Service, StoreError> {
        self.inner.update_service(service).await
    }

    async fn update_service_status(
        &self,
        namespace: &str,
        name: &str,
        status: ServiceStatus,
    ) -> Result<Service, StoreError> {
        let key = format!("{namespace}/{name}");
        self.guarded(
            Operation::UpdateServiceStatus,
            key,
            self.inner.update_service_status(namespace, name, status),
        )
        .await
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<bool, StoreError> {
        self.inner.delete_service(namespace, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;

    #[tokio::test]
    async fn test_lost_ack_applies_the_write() {
        let store = FaultyStore::new(InMemoryStore::new());
        store.inject(Operation::CreateResource, FaultKind::LostAck, 1);

        let result = store.create_resource(Resource::new("default", "web-1")).await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
        assert!(store.inner().get_resource("default", "web-1").await.is_ok());

        // Retrying the same create now reports the key as taken
        let retry = store.create_resource(Resource::new("default", "web-1")).await;
        assert!(matches!(retry, Err(StoreError::AlreadyExists(_))));
        assert_eq!(store.calls(Operation::CreateResource), 2);
        assert_eq!(store.pending(Operation::CreateResource), 0);
    }

    #[tokio::test]
    async fn test_throttle_does_not_apply() {
        let store = FaultyStore::new(InMemoryStore::new());
        store.inject(Operation::CreateResource, FaultKind::Throttle, 2);

        for _ in 0..2 {
            let result = store.create_resource(Resource::new("default", "web-1")).await;
            assert!(matches!(result, Err(StoreError::Throttled(_))));
        }
        assert!(store.inner().get_resource("default", "web-1").await.is_err());
        assert!(store.create_resource(Resource::new("default", "web-1")).await.is_ok());
    }
}
