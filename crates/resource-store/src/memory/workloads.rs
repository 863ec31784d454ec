//! Workload operations for InMemoryStore
//!
//! Admission (self-consistency, placement immutability) runs on every spec
//! write. Status writes skip admission and leave the generation untouched.

use super::{parse_version, InMemoryStore};
use crate::error::StoreError;
use crds::{ObjectKey, Workload, WorkloadStatus, DEFAULT_NAMESPACE};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub(crate) fn list(store: &InMemoryStore, namespace: Option<&str>) -> Vec<Workload> {
    store
        .state()
        .workloads
        .iter()
        .filter(|(key, _)| namespace.is_none_or(|ns| key.namespace == ns))
        .map(|(_, w)| w.clone())
        .collect()
}

pub(crate) fn get(store: &InMemoryStore, namespace: &str, name: &str) -> Result<Workload, StoreError> {
    let key = ObjectKey::new(namespace, name);
    store
        .state()
        .workloads
        .get(&key)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("Workload {key}")))
}

pub(crate) fn create(store: &InMemoryStore, mut workload: Workload) -> Result<Workload, StoreError> {
    if let Err(e) = workload.validate() {
        warn!("Rejected workload {}: {}", workload.name(), e);
        return Err(e.into());
    }
    if workload.metadata.namespace.is_none() {
        workload.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
    }

    let mut state = store.state();
    let key = workload.object_key();
    if state.workloads.contains_key(&key) {
        return Err(StoreError::AlreadyExists(format!("Workload {key}")));
    }

    let revision = state.bump();
    workload.metadata.uid = Some(Uuid::new_v4().to_string());
    workload.metadata.resource_version = Some(revision.to_string());
    workload.metadata.generation = Some(1);
    workload.status = Some(WorkloadStatus::default());
    state.workloads.insert(key.clone(), workload.clone());
    store.notify(revision);

    info!(
        "Admitted workload {} ({} placement, selector {})",
        key,
        workload.spec.placement.variant(),
        workload.spec.selector
    );
    Ok(workload)
}

pub(crate) fn update(store: &InMemoryStore, mut workload: Workload) -> Result<Workload, StoreError> {
    if workload.metadata.namespace.is_none() {
        workload.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
    }

    let mut state = store.state();
    let key = workload.object_key();
    let stored = state
        .workloads
        .get(&key)
        .ok_or_else(|| StoreError::NotFound(format!("Workload {key}")))?;

    if let Err(e) = workload.validate_update(stored) {
        warn!("Rejected update of workload {}: {}", key, e);
        return Err(e.into());
    }

    let actual = parse_version(stored.metadata.resource_version.as_deref());
    if workload.metadata.resource_version.is_some() {
        let expected = parse_version(workload.metadata.resource_version.as_deref());
        if expected != actual {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
                actual,
            });
        }
    }

    let generation = stored.metadata.generation.unwrap_or(1);
    workload.metadata.generation = Some(if workload.spec == stored.spec {
        generation
    } else {
        generation + 1
    });
    workload.metadata.uid = stored.metadata.uid.clone();
    workload.status = stored.status.clone();

    let revision = state.bump();
    workload.metadata.resource_version = Some(revision.to_string());
    state.workloads.insert(key.clone(), workload.clone());
    store.notify(revision);

    debug!("Updated workload {} at revision {}", key, revision);
    Ok(workload)
}

pub(crate) fn update_status(
    store: &InMemoryStore,
    namespace: &str,
    name: &str,
    status: WorkloadStatus,
) -> Result<Workload, StoreError> {
    let mut state = store.state();
    let key = ObjectKey::new(namespace, name);
    let revision = state.revision + 1;
    let workload = state
        .workloads
        .get_mut(&key)
        .ok_or_else(|| StoreError::NotFound(format!("Workload {key}")))?;

    workload.status = Some(status);
    workload.metadata.resource_version = Some(revision.to_string());
    let updated = workload.clone();
    state.bump();
    store.notify(revision);

    Ok(updated)
}

pub(crate) fn delete(store: &InMemoryStore, namespace: &str, name: &str) -> bool {
    let mut state = store.state();
    let key = ObjectKey::new(namespace, name);
    if state.workloads.remove(&key).is_none() {
        return false;
    }
    let revision = state.bump();
    store.notify(revision);
    info!("Deleted workload {}", key);
    true
}
