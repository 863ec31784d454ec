//! Integration tests for the in-memory resource store

use crds::{
    LabelSelector, Node, OwnerReference, Placement, Resource, ResourceTemplate, Service,
    ServiceSpec, ServiceStatus, ValidationError, Workload, WorkloadPhase, WorkloadSpec,
    WorkloadStatus,
};
use resource_store::{InMemoryStore, Preconditions, ResourceStore, StoreError};

fn workload(name: &str, placement: Placement) -> Workload {
    Workload::new(
        name,
        WorkloadSpec {
            selector: LabelSelector::from_labels([("app", "x")]),
            template: ResourceTemplate::with_labels([("app", "x")]),
            placement,
        },
    )
}

#[tokio::test]
async fn test_update_requires_current_version() {
    let store = InMemoryStore::new();
    let created = store
        .create_resource(Resource::new("default", "web-1").with_labels([("app", "x")]))
        .await
        .unwrap();
    assert!(!created.uid.is_empty());
    assert!(created.created_at.is_some());

    let mut first = created.clone();
    first.labels.insert("app".to_string(), "debug".to_string());
    let updated = store.update_resource(first).await.unwrap();
    assert!(updated.resource_version > created.resource_version);
    assert_eq!(updated.uid, created.uid);

    // A writer holding the old version loses
    let mut stale = created.clone();
    stale.labels.insert("tier".to_string(), "web".to_string());
    let err = store.update_resource(stale).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_create_rejects_duplicate_key() {
    let store = InMemoryStore::new();
    store.create_resource(Resource::new("default", "web-1")).await.unwrap();
    let err = store
        .create_resource(Resource::new("default", "web-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));

    // Same name in another namespace is a different object
    assert!(store.create_resource(Resource::new("other", "web-1")).await.is_ok());
}

#[tokio::test]
async fn test_delete_preconditions() {
    let store = InMemoryStore::new();
    let owner = OwnerReference::new("Workload", "web", "uid-a");
    let created = store
        .create_resource(Resource::new("default", "web-1").with_owner(owner))
        .await
        .unwrap();

    let wrong_owner = Preconditions::for_owned(&created, "uid-b");
    let err = store
        .delete_resource("default", "web-1", wrong_owner)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::PreconditionFailed(_)));

    let stale = Preconditions {
        resource_version: Some(created.resource_version + 100),
        owner_uid: None,
    };
    let err = store.delete_resource("default", "web-1", stale).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));

    let removed = store
        .delete_resource("default", "web-1", Preconditions::for_owned(&created, "uid-a"))
        .await
        .unwrap();
    assert_eq!(removed.map(|r| r.name), Some("web-1".to_string()));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let store = InMemoryStore::new();
    store.create_resource(Resource::new("default", "web-1")).await.unwrap();

    let first = store
        .delete_resource("default", "web-1", Preconditions::none())
        .await
        .unwrap();
    assert!(first.is_some());
    let second = store
        .delete_resource("default", "web-1", Preconditions::none())
        .await
        .unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn test_list_filters_by_namespace_and_selector() {
    let store = InMemoryStore::new();
    for (ns, name, app) in [("default", "a", "x"), ("default", "b", "y"), ("other", "c", "x")] {
        store
            .create_resource(Resource::new(ns, name).with_labels([("app", app)]))
            .await
            .unwrap();
    }
    let selector = LabelSelector::from_labels([("app", "x")]);

    let all_x = store.list_resources(None, Some(&selector)).await.unwrap();
    assert_eq!(all_x.len(), 2);

    let default_x = store
        .list_resources(Some("default"), Some(&selector))
        .await
        .unwrap();
    assert_eq!(default_x.len(), 1);
    assert_eq!(default_x[0].name, "a");
}

#[tokio::test]
async fn test_workload_admission() {
    let store = InMemoryStore::new();

    let mut inconsistent = workload("web", Placement::Replicated { replicas: 2 });
    inconsistent.spec.template = ResourceTemplate::with_labels([("app", "y")]);
    let err = store.create_workload(inconsistent).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Rejected(ValidationError::TemplateMismatch { .. })
    ));
    assert!(store.list_workloads(None).await.unwrap().is_empty());

    let created = store
        .create_workload(workload("web", Placement::Replicated { replicas: 2 }))
        .await
        .unwrap();
    assert!(created.metadata.uid.is_some());
    assert_eq!(created.metadata.namespace.as_deref(), Some("default"));
    assert_eq!(created.metadata.generation, Some(1));
    assert_eq!(
        created.status.as_ref().map(|s| s.phase),
        Some(WorkloadPhase::Pending)
    );
}

#[tokio::test]
async fn test_workload_placement_is_immutable() {
    let store = InMemoryStore::new();
    let created = store
        .create_workload(workload("web", Placement::Replicated { replicas: 2 }))
        .await
        .unwrap();

    let mut scaled = created.clone();
    scaled.spec.placement = Placement::Replicated { replicas: 4 };
    let scaled = store.update_workload(scaled).await.unwrap();
    assert_eq!(scaled.metadata.generation, Some(2));
    assert_eq!(scaled.metadata.uid, created.metadata.uid);

    let mut cast = scaled.clone();
    cast.spec.placement = Placement::PerNode { node_selector: None };
    let err = store.update_workload(cast).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Rejected(ValidationError::PlacementChanged { .. })
    ));

    // Stale version is rejected even for an allowed change
    let mut stale = created.clone();
    stale.spec.placement = Placement::Replicated { replicas: 1 };
    assert!(matches!(
        store.update_workload(stale).await,
        Err(StoreError::Conflict { .. })
    ));
}

#[tokio::test]
async fn test_status_update_keeps_generation() {
    let store = InMemoryStore::new();
    store
        .create_workload(workload("web", Placement::Replicated { replicas: 1 }))
        .await
        .unwrap();

    let status = WorkloadStatus {
        phase: WorkloadPhase::Stable,
        desired: 1,
        current: 1,
        observed_generation: Some(1),
        ..Default::default()
    };
    let updated = store
        .update_workload_status("default", "web", status.clone())
        .await
        .unwrap();
    assert_eq!(updated.status, Some(status));
    assert_eq!(updated.metadata.generation, Some(1));
}

#[tokio::test]
async fn test_service_lifecycle() {
    let store = InMemoryStore::new();
    let service = Service::new(
        "web",
        ServiceSpec {
            selector: LabelSelector::from_labels([("app", "x")]),
        },
    );
    store.create_service(service).await.unwrap();

    let status = ServiceStatus {
        endpoints: vec!["a".to_string(), "b".to_string()],
        observed_generation: Some(1),
    };
    let updated = store
        .update_service_status("default", "web", status)
        .await
        .unwrap();
    assert_eq!(updated.endpoints(), ["a".to_string(), "b".to_string()]);

    assert!(store.delete_service("default", "web").await.unwrap());
    assert!(!store.delete_service("default", "web").await.unwrap());
}

#[tokio::test]
async fn test_revision_feed_wakes_subscribers() {
    let store = InMemoryStore::new();
    let mut changes = store.subscribe();
    assert_eq!(*changes.borrow_and_update(), 0);

    store.put_node(Node::new("node1")).await.unwrap();
    store.create_resource(Resource::new("default", "a")).await.unwrap();

    // Only the latest revision is observed
    changes.changed().await.unwrap();
    assert_eq!(*changes.borrow_and_update(), 2);
    assert_eq!(store.revision(), 2);

    assert!(store.delete_node("node1").await.unwrap());
    assert!(!store.delete_node("node1").await.unwrap());
    changes.changed().await.unwrap();
    assert_eq!(*changes.borrow_and_update(), 3);
}
