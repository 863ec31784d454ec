//! ResourceStore trait
//!
//! The store is the single source of truth for resources, nodes, workloads and
//! services. Controllers and service projectors only ever talk to it through
//! this trait, so the in-memory implementation and any remote-backed one are
//! interchangeable.

use crate::error::StoreError;
use crds::{LabelSelector, Node, Resource, Service, ServiceStatus, Workload, WorkloadStatus};
use tokio::sync::watch;

/// Commit-time checks for a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    /// Reject unless the stored object still has this version
    pub resource_version: Option<u64>,
    /// Reject unless the stored object is owned by this UID
    pub owner_uid: Option<String>,
}

impl Preconditions {
    pub fn none() -> Self {
        Self::default()
    }

    /// Preconditions that pin both the version and the owner of `resource`.
    pub fn for_owned(resource: &Resource, owner_uid: impl Into<String>) -> Self {
        Self {
            resource_version: Some(resource.resource_version),
            owner_uid: Some(owner_uid.into()),
        }
    }
}

/// Trait for resource store operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    /// Change feed: the receiver observes the store revision, which increases on every write.
    ///
    /// Only the latest value is retained, so a woken subscriber must re-read state.
    fn subscribe(&self) -> watch::Receiver<u64>;

    /// Current revision
    fn revision(&self) -> u64;

    // Resource Operations
    async fn list_resources(
        &self,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Resource>, StoreError>;
    async fn get_resource(&self, namespace: &str, name: &str) -> Result<Resource, StoreError>;
    /// Fails with `AlreadyExists` if the key is taken.
    async fn create_resource(&self, resource: Resource) -> Result<Resource, StoreError>;
    /// Conditional on `resource.resource_version` matching the stored version.
    async fn update_resource(&self, resource: Resource) -> Result<Resource, StoreError>;
    /// Delete-if-exists: returns `Ok(None)` when there was nothing to delete.
    async fn delete_resource(
        &self,
        namespace: &str,
        name: &str,
        preconditions: Preconditions,
    ) -> Result<Option<Resource>, StoreError>;

    // Node Operations
    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError>;
    async fn put_node(&self, node: Node) -> Result<(), StoreError>;
    async fn delete_node(&self, name: &str) -> Result<bool, StoreError>;

    // Workload Operations
    async fn list_workloads(&self, namespace: Option<&str>) -> Result<Vec<Workload>, StoreError>;
    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Workload, StoreError>;
    /// Runs admission; a self-inconsistent workload is `Rejected`.
    async fn create_workload(&self, workload: Workload) -> Result<Workload, StoreError>;
    /// Runs admission (including placement immutability) and, when
    /// `metadata.resource_version` is set, an optimistic concurrency check.
    async fn update_workload(&self, workload: Workload) -> Result<Workload, StoreError>;
    async fn update_workload_status(
        &self,
        namespace: &str,
        name: &str,
        status: WorkloadStatus,
    ) -> Result<Workload, StoreError>;
    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<bool, StoreError>;

    // Service Operations
    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>, StoreError>;
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, StoreError>;
    async fn create_service(&self, service: Service) -> Result<Service, StoreError>;
    async fn update_service(&self, service: Service) -> Result<Service, StoreError>;
    async fn update_service_status(
        &self,
        namespace: &str,
        name: &str,
        status: ServiceStatus,
    ) -> Result<Service, StoreError>;
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<bool, StoreError>;
}
