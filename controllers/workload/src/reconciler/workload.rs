//! Workload reconciler
//!
//! A workload only ever counts, creates and deletes resources it owns (by UID)
//! that still match its selector. Owned resources that were relabelled out of
//! the selector are orphaned: no longer counted, never deleted.

use super::{Action, Reconciler};
use crate::error::ControllerError;
use crate::metrics::{RESULT_ERROR, RESULT_FAILED, RESULT_SUCCESS};
use crate::retry::retry_transient;
use crds::{
    LabelSelector, Node, OwnerReference, Placement, Resource, Workload, WorkloadPhase,
    WorkloadStatus, WORKLOAD_KIND,
};
use resource_store::{Preconditions, StoreError};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Length of the random suffix in replicated resource names.
const NAME_SUFFIX_LEN: usize = 5;

/// A resource the reconciler intends to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedResource {
    pub name: String,
    pub node_name: Option<String>,
}

/// Difference between desired and observed state for one workload.
#[derive(Debug, Clone, Default)]
pub struct WorkloadPlan {
    pub desired: u32,
    /// Owned resources that match the selector
    pub accounted: Vec<Resource>,
    /// Owned resources that no longer match the selector; left alone
    pub orphaned: Vec<Resource>,
    pub create: Vec<PlannedResource>,
    /// Newest first
    pub delete: Vec<Resource>,
}

impl WorkloadPlan {
    pub fn is_converged(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }

    /// Accounted count once every planned action has been applied.
    pub fn expected_current(&self) -> usize {
        (self.accounted.len() + self.create.len()).saturating_sub(self.delete.len())
    }
}

/// Deletion order: newest created first, ties broken by name descending.
pub fn newest_first(a: &Resource, b: &Resource) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.name.cmp(&a.name))
}

fn oldest_first(a: &Resource, b: &Resource) -> Ordering {
    newest_first(b, a)
}

fn short_suffix() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..NAME_SUFFIX_LEN].to_string()
}

/// `{workload}-{5 hex chars}`, avoiding names already in use.
fn replicated_name(workload: &str, taken: &mut BTreeSet<String>) -> String {
    loop {
        let name = format!("{}-{}", workload, short_suffix());
        if taken.insert(name.clone()) {
            return name;
        }
    }
}

/// `{workload}-{node}`, or a suffixed variant if that name is already in use.
fn per_node_name(workload: &str, node: &str, taken: &mut BTreeSet<String>) -> String {
    let name = format!("{workload}-{node}");
    if taken.insert(name.clone()) {
        return name;
    }
    loop {
        let name = format!("{}-{}-{}", workload, node, short_suffix());
        if taken.insert(name.clone()) {
            return name;
        }
    }
}

/// Compute what it takes to converge `workload`.
///
/// `resources` may span namespaces; only those in the workload's namespace are
/// considered. Pure apart from name generation.
pub fn plan_workload(
    workload: &Workload,
    owner_uid: &str,
    resources: &[Resource],
    nodes: &[Node],
) -> WorkloadPlan {
    let namespace = workload.namespace_or_default();
    let name = workload.name();
    let in_namespace: Vec<&Resource> = resources.iter().filter(|r| r.namespace == namespace).collect();
    let mut taken: BTreeSet<String> = in_namespace.iter().map(|r| r.name.clone()).collect();

    let (accounted, orphaned): (Vec<Resource>, Vec<Resource>) = in_namespace
        .into_iter()
        .filter(|r| r.is_owned_by(owner_uid))
        .cloned()
        .partition(|r| r.matches(&workload.spec.selector));

    let mut plan = WorkloadPlan {
        accounted,
        orphaned,
        ..Default::default()
    };

    match &workload.spec.placement {
        Placement::Replicated { replicas } => {
            plan.desired = *replicas;
            let desired = *replicas as usize;
            let current = plan.accounted.len();
            if current > desired {
                let mut by_age = plan.accounted.clone();
                by_age.sort_by(newest_first);
                by_age.truncate(current - desired);
                plan.delete = by_age;
            } else {
                plan.create = (current..desired)
                    .map(|_| PlannedResource {
                        name: replicated_name(&name, &mut taken),
                        node_name: None,
                    })
                    .collect();
            }
        }
        Placement::PerNode { node_selector } => {
            let eligible: BTreeSet<&str> = nodes
                .iter()
                .filter(|n| n.is_eligible(node_selector.as_ref()))
                .map(|n| n.name.as_str())
                .collect();
            plan.desired = u32::try_from(eligible.len()).unwrap_or(u32::MAX);

            let mut per_node: BTreeMap<&str, Vec<Resource>> = BTreeMap::new();
            for resource in &plan.accounted {
                match resource.node_name.as_deref() {
                    Some(node) if eligible.contains(node) => {
                        per_node.entry(node).or_default().push(resource.clone());
                    }
                    // Unbound, or bound to a node that left or became ineligible
                    _ => plan.delete.push(resource.clone()),
                }
            }

            for node in &eligible {
                match per_node.get_mut(node) {
                    None => plan.create.push(PlannedResource {
                        name: per_node_name(&name, node, &mut taken),
                        node_name: Some((*node).to_string()),
                    }),
                    Some(bound) => {
                        bound.sort_by(oldest_first);
                        plan.delete.extend(bound.drain(1..));
                    }
                }
            }
            plan.delete.sort_by(newest_first);
        }
    }

    plan
}

/// Refuse to touch a resource this owner did not create.
pub(crate) fn ensure_owned(resource: &Resource, owner: &OwnerReference) -> Result<(), ControllerError> {
    if resource.is_owned_by(&owner.uid) {
        return Ok(());
    }
    let holder = resource
        .owner
        .as_ref()
        .map_or_else(|| "nobody".to_string(), ToString::to_string);
    error!(
        "Refusing to mutate resource {}: owned by {}, not {}",
        resource.key(),
        holder,
        owner
    );
    Err(ControllerError::OwnershipViolation(format!(
        "resource {} is owned by {}, not {}",
        resource.key(),
        holder,
        owner
    )))
}

/// Status is only written when it differs from what is recorded.
pub fn workload_status_needs_update(recorded: Option<&WorkloadStatus>, desired: &WorkloadStatus) -> bool {
    recorded != Some(desired)
}

fn count(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

impl Reconciler {
    pub async fn reconcile_workload(&self, workload: &Workload) -> Result<Action, ControllerError> {
        let name = workload.name();
        let namespace = workload.namespace_or_default();
        let mut recorded = workload.status.clone();

        info!("Reconciling Workload {}/{}", namespace, name);

        if let Err(e) = workload.validate() {
            error!("Workload {}/{} is invalid: {}", namespace, name, e);
            let status = WorkloadStatus {
                phase: WorkloadPhase::Failed,
                desired: 0,
                current: recorded.as_ref().map_or(0, |s| s.current),
                degraded: false,
                message: Some(e.to_string()),
                observed_generation: workload.metadata.generation,
            };
            self.write_workload_status(&namespace, &name, &mut recorded, status)
                .await?;
            self.metrics.record_reconciliation(WORKLOAD_KIND, RESULT_FAILED);
            // Nothing to do until the spec changes
            return Ok(Action::await_change());
        }

        let owner = workload.owner_reference().ok_or_else(|| {
            ControllerError::InvalidConfig(format!("Workload {namespace}/{name} has no uid"))
        })?;

        let resources = self.store.list_resources(Some(&namespace), None).await?;
        let nodes = match workload.spec.placement {
            Placement::PerNode { .. } => self.store.list_nodes().await?,
            Placement::Replicated { .. } => Vec::new(),
        };
        let plan = plan_workload(workload, &owner.uid, &resources, &nodes);

        for orphan in &plan.orphaned {
            debug!(
                "Resource {} is owned by Workload {}/{} but no longer matches {}; not counted",
                orphan.key(),
                namespace,
                name,
                workload.spec.selector
            );
        }

        let status_for = |phase, current: usize, degraded, message: Option<String>| WorkloadStatus {
            phase,
            desired: plan.desired,
            current: count(current),
            degraded,
            message,
            observed_generation: workload.metadata.generation,
        };

        if plan.is_converged() {
            debug!("Workload {}/{} is converged at {}", namespace, name, plan.desired);
            let status = status_for(WorkloadPhase::Stable, plan.accounted.len(), false, None);
            self.write_workload_status(&namespace, &name, &mut recorded, status)
                .await?;
            self.metrics
                .set_owned_resources(&namespace, &name, plan.accounted.len());
            self.metrics.record_reconciliation(WORKLOAD_KIND, RESULT_SUCCESS);
            return Ok(Action::await_change());
        }

        info!(
            "Workload {}/{}: {} owned, {} desired; creating {}, deleting {}",
            namespace,
            name,
            plan.accounted.len(),
            plan.desired,
            plan.create.len(),
            plan.delete.len()
        );

        let (degraded, message) = recorded
            .as_ref()
            .map(|s| (s.degraded, s.message.clone()))
            .unwrap_or_default();
        let progress = status_for(WorkloadPhase::Reconciling, plan.accounted.len(), degraded, message);
        self.write_workload_status(&namespace, &name, &mut recorded, progress)
            .await?;

        let mut current = plan.accounted.len();
        let mut first_error: Option<ControllerError> = None;

        for planned in &plan.create {
            match self.create_owned_resource(workload, &owner, planned).await {
                Ok(()) => current += 1,
                Err(e) => {
                    warn!(
                        "Failed to create resource {}/{} for Workload {}: {}",
                        namespace, planned.name, name, e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        for resource in &plan.delete {
            match self
                .delete_owned_resource(&owner, &workload.spec.selector, resource)
                .await
            {
                Ok(()) => current = current.saturating_sub(1),
                Err(e) => {
                    warn!(
                        "Failed to delete resource {} for Workload {}: {}",
                        resource.key(),
                        name,
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        self.metrics.set_owned_resources(&namespace, &name, current);

        match first_error {
            None => {
                let phase = if current == plan.desired as usize {
                    WorkloadPhase::Stable
                } else {
                    WorkloadPhase::Reconciling
                };
                let status = status_for(phase, current, false, None);
                self.write_workload_status(&namespace, &name, &mut recorded, status)
                    .await?;
                self.metrics.record_reconciliation(WORKLOAD_KIND, RESULT_SUCCESS);
                info!(
                    "Workload {}/{} reconciled: {}/{} ({:?})",
                    namespace, name, current, plan.desired, phase
                );
                Ok(Action::await_change())
            }
            Some(e) => {
                let degraded = matches!(e, ControllerError::Degraded { .. });
                let status = status_for(WorkloadPhase::Reconciling, current, degraded, Some(e.to_string()));
                if let Err(status_err) = self
                    .write_workload_status(&namespace, &name, &mut recorded, status)
                    .await
                {
                    error!(
                        "Failed to record status of Workload {}/{}: {}",
                        namespace, name, status_err
                    );
                }
                self.metrics.record_reconciliation(WORKLOAD_KIND, RESULT_ERROR);
                Err(e)
            }
        }
    }

    /// Create one resource from the workload template, tagged with `owner`.
    ///
    /// The name is fixed for every retry, so a create whose acknowledgement was
    /// lost shows up as `AlreadyExists` with our owner and counts as done.
    async fn create_owned_resource(
        &self,
        workload: &Workload,
        owner: &OwnerReference,
        planned: &PlannedResource,
    ) -> Result<(), ControllerError> {
        let namespace = workload.namespace_or_default();
        let template = &workload.spec.template;
        let mut resource = Resource::new(namespace.clone(), planned.name.clone())
            .with_labels(template.labels.clone())
            .with_owner(owner.clone());
        resource.kind = template.kind.clone();
        resource.spec = template.spec.clone();
        resource.node_name = planned.node_name.clone();

        let store = self.store();
        let desired = &resource;
        let result = retry_transient(&self.retry, "create_resource", move || {
            let resource = desired.clone();
            async move { store.create_resource(resource).await }
        })
        .await;

        match result {
            Ok(created) => {
                info!(
                    "Created resource {} for Workload {}/{}{}",
                    created.key(),
                    namespace,
                    owner.name,
                    planned
                        .node_name
                        .as_ref()
                        .map(|node| format!(" on node {node}"))
                        .unwrap_or_default()
                );
                Ok(())
            }
            Err(ControllerError::Store(StoreError::AlreadyExists(_))) => {
                let existing = self.store.get_resource(&namespace, &planned.name).await?;
                if existing.is_owned_by(&owner.uid) {
                    debug!("Resource {} already created by an earlier attempt", existing.key());
                    Ok(())
                } else {
                    Err(ControllerError::OwnershipViolation(format!(
                        "resource {} already exists and is not owned by {}",
                        existing.key(),
                        owner
                    )))
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Delete an owned resource.
    ///
    /// Every attempt re-reads the resource: if it is gone, no longer owned, or no
    /// longer matches the selector it has already left the accounting set and is
    /// left alone. The store re-checks owner and version at commit.
    async fn delete_owned_resource(
        &self,
        owner: &OwnerReference,
        selector: &LabelSelector,
        resource: &Resource,
    ) -> Result<(), ControllerError> {
        ensure_owned(resource, owner)?;

        let store = self.store();
        let namespace = resource.namespace.as_str();
        let name = resource.name.as_str();
        let uid = owner.uid.as_str();

        retry_transient(&self.retry, "delete_resource", move || async move {
            let current = match store.get_resource(namespace, name).await {
                Ok(current) => current,
                Err(StoreError::NotFound(_)) => return Ok(()),
                Err(e) => return Err(e),
            };
            if !current.is_owned_by(uid) || !current.matches(selector) {
                debug!(
                    "Resource {}/{} changed hands or labels since planning; leaving it",
                    namespace, name
                );
                return Ok(());
            }
            store
                .delete_resource(namespace, name, Preconditions::for_owned(&current, uid))
                .await
                .map(|_| ())
        })
        .await?;

        info!("Deleted resource {}/{} owned by {}", namespace, name, owner);
        Ok(())
    }

    async fn write_workload_status(
        &self,
        namespace: &str,
        name: &str,
        recorded: &mut Option<WorkloadStatus>,
        status: WorkloadStatus,
    ) -> Result<(), ControllerError> {
        if !workload_status_needs_update(recorded.as_ref(), &status) {
            debug!("Workload {}/{} status unchanged, skipping update", namespace, name);
            return Ok(());
        }

        let store = self.store();
        let desired = &status;
        retry_transient(&self.retry, "update_workload_status", move || {
            let status = desired.clone();
            async move { store.update_workload_status(namespace, name, status).await }
        })
        .await?;

        *recorded = Some(status);
        Ok(())
    }
}
