//! Service operations for InMemoryStore

use super::{parse_version, InMemoryStore};
use crate::error::StoreError;
use crds::{ObjectKey, Service, ServiceStatus, DEFAULT_NAMESPACE};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub(crate) fn list(store: &InMemoryStore, namespace: Option<&str>) -> Vec<Service> {
    store
        .state()
        .services
        .iter()
        .filter(|(key, _)| namespace.is_none_or(|ns| key.namespace == ns))
        .map(|(_, s)| s.clone())
        .collect()
}

pub(crate) fn get(store: &InMemoryStore, namespace: &str, name: &str) -> Result<Service, StoreError> {
    let key = ObjectKey::new(namespace, name);
    store
        .state()
        .services
        .get(&key)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("Service {key}")))
}

pub(crate) fn create(store: &InMemoryStore, mut service: Service) -> Result<Service, StoreError> {
    if let Err(e) = service.validate() {
        warn!("Rejected service {}: {}", service.name(), e);
        return Err(e.into());
    }
    if service.metadata.namespace.is_none() {
        service.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
    }

    let mut state = store.state();
    let key = service.object_key();
    if state.services.contains_key(&key) {
        return Err(StoreError::AlreadyExists(format!("Service {key}")));
    }

    let revision = state.bump();
    service.metadata.uid = Some(Uuid::new_v4().to_string());
    service.metadata.resource_version = Some(revision.to_string());
    service.metadata.generation = Some(1);
    service.status = Some(ServiceStatus::default());
    state.services.insert(key.clone(), service.clone());
    store.notify(revision);

    info!("Admitted service {} (selector {})", key, service.spec.selector);
    Ok(service)
}

pub(crate) fn update(store: &InMemoryStore, mut service: Service) -> Result<Service, StoreError> {
    if let Err(e) = service.validate() {
        warn!("Rejected update of service {}: {}", service.name(), e);
        return Err(e.into());
    }
    if service.metadata.namespace.is_none() {
        service.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
    }

    let mut state = store.state();
    let key = service.object_key();
    let stored = state
        .services
        .get(&key)
        .ok_or_else(|| StoreError::NotFound(format!("Service {key}")))?;

    let actual = parse_version(stored.metadata.resource_version.as_deref());
    if service.metadata.resource_version.is_some() {
        let expected = parse_version(service.metadata.resource_version.as_deref());
        if expected != actual {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
                actual,
            });
        }
    }

    let generation = stored.metadata.generation.unwrap_or(1);
    service.metadata.generation = Some(if service.spec == stored.spec {
        generation
    } else {
        generation + 1
    });
    service.metadata.uid = stored.metadata.uid.clone();
    service.status = stored.status.clone();

    let revision = state.bump();
    service.metadata.resource_version = Some(revision.to_string());
    state.services.insert(key.clone(), service.clone());
    store.notify(revision);

    debug!("Updated service {} at revision {}", key, revision);
    Ok(service)
}

pub(crate) fn update_status(
    store: &InMemoryStore,
    namespace: &str,
    name: &str,
    status: ServiceStatus,
) -> Result<Service, StoreError> {
    let mut state = store.state();
    let key = ObjectKey::new(namespace, name);
    let revision = state.revision + 1;
    let service = state
        .services
        .get_mut(&key)
        .ok_or_else(|| StoreError::NotFound(format!("Service {key}")))?;

    service.status = Some(status);
    service.metadata.resource_version = Some(revision.to_string());
    let updated = service.clone();
    state.bump();
    store.notify(revision);

    Ok(updated)
}

pub(crate) fn delete(store: &InMemoryStore, namespace: &str, name: &str) -> bool {
    let mut state = store.state();
    let key = ObjectKey::new(namespace, name);
    if state.services.remove(&key).is_none() {
        return false;
    }
    let revision = state.bump();
    store.notify(revision);
    info!("Deleted service {}", key);
    true
}
