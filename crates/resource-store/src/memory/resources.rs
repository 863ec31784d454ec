//! Resource operations for InMemoryStore

use super::InMemoryStore;
use crate::error::StoreError;
use crate::store_trait::Preconditions;
use crds::{LabelSelector, ObjectKey, Resource, ValidationError};
use tracing::debug;
use uuid::Uuid;

pub(crate) fn list(
    store: &InMemoryStore,
    namespace: Option<&str>,
    selector: Option<&LabelSelector>,
) -> Vec<Resource> {
    store
        .state()
        .resources
        .values()
        .filter(|r| namespace.is_none_or(|ns| r.namespace == ns))
        .filter(|r| selector.is_none_or(|s| r.matches(s)))
        .cloned()
        .collect()
}

pub(crate) fn get(store: &InMemoryStore, namespace: &str, name: &str) -> Result<Resource, StoreError> {
    let key = ObjectKey::new(namespace, name);
    store
        .state()
        .resources
        .get(&key)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("Resource {key}")))
}

pub(crate) fn create(store: &InMemoryStore, mut resource: Resource) -> Result<Resource, StoreError> {
    if resource.name.is_empty() {
        return Err(ValidationError::MissingName("Resource").into());
    }

    let mut state = store.state();
    let key = resource.key();
    if state.resources.contains_key(&key) {
        return Err(StoreError::AlreadyExists(format!("Resource {key}")));
    }

    let revision = state.bump();
    resource.uid = Uuid::new_v4().to_string();
    resource.resource_version = revision;
    resource.created_at = Some(state.next_creation_timestamp());
    state.resources.insert(key.clone(), resource.clone());
    store.notify(revision);

    debug!("Created resource {} at revision {}", key, revision);
    Ok(resource)
}

pub(crate) fn update(store: &InMemoryStore, mut resource: Resource) -> Result<Resource, StoreError> {
    let mut state = store.state();
    let key = resource.key();
    let stored = state
        .resources
        .get(&key)
        .ok_or_else(|| StoreError::NotFound(format!("Resource {key}")))?;

    if stored.resource_version != resource.resource_version {
        return Err(StoreError::Conflict {
            key: key.to_string(),
            expected: resource.resource_version,
            actual: stored.resource_version,
        });
    }

    // Identity and creation metadata are immutable
    resource.uid = stored.uid.clone();
    resource.created_at = stored.created_at;

    let revision = state.bump();
    resource.resource_version = revision;
    state.resources.insert(key.clone(), resource.clone());
    store.notify(revision);

    debug!("Updated resource {} at revision {}", key, revision);
    Ok(resource)
}

pub(crate) fn delete(
    store: &InMemoryStore,
    namespace: &str,
    name: &str,
    preconditions: &Preconditions,
) -> Result<Option<Resource>, StoreError> {
    let mut state = store.state();
    let key = ObjectKey::new(namespace, name);
    let Some(stored) = state.resources.get(&key) else {
        debug!("Resource {} already gone", key);
        return Ok(None);
    };

    if let Some(expected) = preconditions.resource_version {
        if stored.resource_version != expected {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
                actual: stored.resource_version,
            });
        }
    }
    if let Some(owner_uid) = preconditions.owner_uid.as_deref() {
        if !stored.is_owned_by(owner_uid) {
            return Err(StoreError::PreconditionFailed(format!(
                "Resource {key} is not owned by {owner_uid}"
            )));
        }
    }

    let removed = state.resources.remove(&key);
    let revision = state.bump();
    store.notify(revision);

    debug!("Deleted resource {} at revision {}", key, revision);
    Ok(removed)
}
