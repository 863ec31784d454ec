//! Test utilities for unit testing reconcilers
//!
//! Builders for workloads, services and nodes, plus a reconciler wired to a
//! store with millisecond retry delays.

use crate::metrics::Metrics;
use crate::reconciler::Reconciler;
use crate::retry::RetryPolicy;
use crds::*;
use resource_store::ResourceStore;
use std::sync::Arc;
use std::time::Duration;

/// Retry policy with 1ms delays so exhaustion tests finish quickly
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        multiplier: 1.0,
    }
}

/// Reconciler over `store` with a fresh metrics registry
pub fn create_test_reconciler(store: impl ResourceStore + 'static) -> Reconciler {
    Reconciler::new(store, fast_retry(3), Arc::new(Metrics::new().unwrap()))
}

fn workload(name: &str, labels: &[(&str, &str)], placement: Placement) -> Workload {
    let mut workload = Workload::new(
        name,
        WorkloadSpec {
            selector: LabelSelector::from_labels(labels.iter().copied()),
            template: ResourceTemplate::with_labels(labels.iter().copied()),
            placement,
        },
    );
    workload.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
    workload
}

/// Replicated workload selecting on, and stamping, `labels`
pub fn create_test_replicated(name: &str, labels: &[(&str, &str)], replicas: u32) -> Workload {
    workload(name, labels, Placement::Replicated { replicas })
}

/// Per-node workload selecting on, and stamping, `labels`
pub fn create_test_per_node(
    name: &str,
    labels: &[(&str, &str)],
    node_selector: Option<LabelSelector>,
) -> Workload {
    workload(name, labels, Placement::PerNode { node_selector })
}

pub fn create_test_service(name: &str, labels: &[(&str, &str)]) -> Service {
    let mut service = Service::new(
        name,
        ServiceSpec {
            selector: LabelSelector::from_labels(labels.iter().copied()),
        },
    );
    service.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
    service
}

/// Put `names` as schedulable, unlabelled nodes
pub async fn add_nodes(store: &dyn ResourceStore, names: &[&str]) {
    for name in names {
        store.put_node(Node::new(*name)).await.unwrap();
    }
}

/// Resources in the default namespace owned by `workload`, sorted by name
pub async fn owned_by(store: &dyn ResourceStore, workload: &Workload) -> Vec<Resource> {
    let uid = workload.metadata.uid.clone().unwrap();
    let mut owned: Vec<Resource> = store
        .list_resources(Some(DEFAULT_NAMESPACE), None)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.is_owned_by(&uid))
        .collect();
    owned.sort_by(|a, b| a.name.cmp(&b.name));
    owned
}
