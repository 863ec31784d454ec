//! Explicit ownership migration and relabelling.
//!
//! A workload's placement cannot be switched in place. To move resources from
//! a replicated workload to a per-node one (or back), create the new workload
//! and hand resources over with [`transfer_ownership`]. The old workload stops
//! counting a resource the moment its owner reference changes, and the new one
//! starts counting it if its labels match the new selector.

use crate::error::ControllerError;
use crate::retry::{retry_transient, RetryPolicy};
use crds::{LabelSet, Resource, ValidationError, Workload};
use resource_store::{ResourceStore, StoreError};
use std::collections::BTreeSet;
use tracing::info;

/// Label upserts and removals applied by [`relabel_resource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelChanges {
    pub set: LabelSet,
    pub remove: BTreeSet<String>,
}

impl LabelChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.remove.remove(&key);
        self.set.insert(key, value.into());
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.set.remove(&key);
        self.remove.insert(key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }

    /// Apply to `labels`; returns whether anything changed.
    pub fn apply(&self, labels: &mut LabelSet) -> bool {
        let mut changed = false;
        for key in &self.remove {
            changed |= labels.remove(key).is_some();
        }
        for (key, value) in &self.set {
            changed |= labels.insert(key.clone(), value.clone()).as_ref() != Some(value);
        }
        changed
    }
}

fn owner_uid(workload: &Workload) -> Result<String, ControllerError> {
    workload.metadata.uid.clone().ok_or_else(|| {
        ControllerError::InvalidConfig(format!("Workload {} has no uid", workload.object_key()))
    })
}

/// Move `resource` from workload `from` to workload `to`.
///
/// Requires that `from` currently owns the resource and that the resource's
/// labels match the selector of `to`. The write is conditional on the version
/// that was checked; a concurrent change causes a fresh read and re-check.
pub async fn transfer_ownership(
    store: &dyn ResourceStore,
    namespace: &str,
    resource: &str,
    from: &Workload,
    to: &Workload,
) -> Result<Resource, ControllerError> {
    let from_uid = owner_uid(from)?;
    let to_owner = to.owner_reference().ok_or_else(|| {
        ControllerError::InvalidConfig(format!("Workload {} has no uid", to.object_key()))
    })?;
    if to.namespace_or_default() != namespace {
        return Err(ControllerError::InvalidConfig(format!(
            "Workload {} cannot own resources in namespace {}",
            to.object_key(),
            namespace
        )));
    }

    let policy = RetryPolicy::default();
    let (from_uid, to_owner) = (&from_uid, &to_owner);
    let selector = &to.spec.selector;

    let moved = retry_transient(&policy, "transfer_ownership", move || async move {
        let mut current = store.get_resource(namespace, resource).await?;
        if current.is_owned_by(&to_owner.uid) {
            // Already moved by an earlier attempt
            return Ok::<_, StoreError>(Ok::<_, ControllerError>(current));
        }
        if !current.is_owned_by(from_uid) {
            return Ok(Err(ControllerError::OwnershipViolation(format!(
                "resource {} is not owned by Workload {}",
                current.key(),
                from.object_key()
            ))));
        }
        if !current.matches(selector) {
            return Ok(Err(ValidationError::NotSelected {
                resource: current.key().to_string(),
                selector: selector.to_string(),
            }
            .into()));
        }
        current.owner = Some(to_owner.clone());
        store.update_resource(current).await.map(Ok)
    })
    .await??;

    info!(
        "Transferred resource {} from Workload {} to Workload {}",
        moved.key(),
        from.object_key(),
        to.object_key()
    );
    Ok(moved)
}

/// Apply `changes` to the labels of a resource, retrying on conflicting writes.
pub async fn relabel_resource(
    store: &dyn ResourceStore,
    namespace: &str,
    name: &str,
    changes: &LabelChanges,
) -> Result<Resource, ControllerError> {
    let policy = RetryPolicy::default();

    let updated = retry_transient(&policy, "relabel_resource", move || async move {
        let mut current = store.get_resource(namespace, name).await?;
        if !changes.apply(&mut current.labels) {
            return Ok::<_, StoreError>(current);
        }
        store.update_resource(current).await
    })
    .await?;

    info!("Relabelled resource {}: {:?}", updated.key(), updated.labels);
    Ok(updated)
}
