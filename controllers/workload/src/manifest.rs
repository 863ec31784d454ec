//! YAML seed manifest.
//!
//! Loads nodes, resources, workloads and services into a store at startup.
//! Selectors may be written either in structured form (`matchLabels` /
//! `matchExpressions`) or as a selector string such as `app=web,tier in (a,b)`.
//!
//! ```yaml
//! nodes:
//!   - name: node1
//!     labels: { gpu: "true" }
//! resources:
//!   - name: rng-legacy
//!     labels: { app: rng }
//! workloads:
//!   - name: rng
//!     selector: app=rng
//!     template:
//!       labels: { app: rng }
//!     placement:
//!       type: Replicated
//!       replicas: 3
//! services:
//!   - name: rng
//!     selector: app=rng
//! ```

use crate::error::ControllerError;
use crds::{
    LabelSelector, Node, Placement, Resource, ResourceTemplate, Service, ServiceSpec, Workload,
    WorkloadSpec, DEFAULT_NAMESPACE,
};
use resource_store::{ResourceStore, StoreError};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// A selector in either of its two accepted spellings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SelectorSource {
    /// `app=web,tier!=db`
    Expression(String),
    Structured(LabelSelector),
}

impl SelectorSource {
    pub fn resolve(&self) -> Result<LabelSelector, ControllerError> {
        match self {
            Self::Expression(text) => Ok(text.parse()?),
            Self::Structured(selector) => Ok(selector.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "PascalCase")]
pub enum PlacementEntry {
    #[serde(rename_all = "camelCase")]
    Replicated { replicas: u32 },
    #[serde(rename_all = "camelCase")]
    PerNode {
        #[serde(default)]
        node_selector: Option<SelectorSource>,
    },
}

impl PlacementEntry {
    fn resolve(&self) -> Result<Placement, ControllerError> {
        Ok(match self {
            Self::Replicated { replicas } => Placement::Replicated { replicas: *replicas },
            Self::PerNode { node_selector } => Placement::PerNode {
                node_selector: node_selector.as_ref().map(SelectorSource::resolve).transpose()?,
            },
        })
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadEntry {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub selector: SelectorSource,
    pub template: ResourceTemplate,
    pub placement: PlacementEntry,
}

impl WorkloadEntry {
    pub fn to_workload(&self) -> Result<Workload, ControllerError> {
        let mut workload = Workload::new(
            &self.name,
            WorkloadSpec {
                selector: self.selector.resolve()?,
                template: self.template.clone(),
                placement: self.placement.resolve()?,
            },
        );
        workload.metadata.namespace = Some(namespace_or_default(self.namespace.as_deref()));
        Ok(workload)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub selector: SelectorSource,
}

impl ServiceEntry {
    pub fn to_service(&self) -> Result<Service, ControllerError> {
        let mut service = Service::new(
            &self.name,
            ServiceSpec {
                selector: self.selector.resolve()?,
            },
        );
        service.metadata.namespace = Some(namespace_or_default(self.namespace.as_deref()));
        Ok(service)
    }
}

fn namespace_or_default(namespace: Option<&str>) -> String {
    namespace.unwrap_or(DEFAULT_NAMESPACE).to_string()
}

/// Counts of objects created by [`Manifest::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestSummary {
    pub nodes: usize,
    pub resources: usize,
    pub workloads: usize,
    pub services: usize,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Manifest {
    pub nodes: Vec<Node>,
    pub resources: Vec<Resource>,
    pub workloads: Vec<WorkloadEntry>,
    pub services: Vec<ServiceEntry>,
}

impl Manifest {
    pub fn from_yaml(text: &str) -> Result<Self, ControllerError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ControllerError> {
        info!("Loading manifest from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Seed `store`. Objects that already exist are skipped; a workload or
    /// service rejected at admission aborts the seed.
    pub async fn apply(&self, store: &dyn ResourceStore) -> Result<ManifestSummary, ControllerError> {
        let mut summary = ManifestSummary::default();

        for node in &self.nodes {
            store.put_node(node.clone()).await?;
            summary.nodes += 1;
        }

        for resource in &self.resources {
            match store.create_resource(resource.clone()).await {
                Ok(_) => summary.resources += 1,
                Err(StoreError::AlreadyExists(key)) => warn!("Skipping existing {}", key),
                Err(e) => return Err(e.into()),
            }
        }

        for entry in &self.workloads {
            match store.create_workload(entry.to_workload()?).await {
                Ok(_) => summary.workloads += 1,
                Err(StoreError::AlreadyExists(key)) => warn!("Skipping existing {}", key),
                Err(e) => return Err(e.into()),
            }
        }

        for entry in &self.services {
            match store.create_service(entry.to_service()?).await {
                Ok(_) => summary.services += 1,
                Err(StoreError::AlreadyExists(key)) => warn!("Skipping existing {}", key),
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            "Manifest applied: {} nodes, {} resources, {} workloads, {} services",
            summary.nodes, summary.resources, summary.workloads, summary.services
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{LabelSelectorRequirement, ValidationError};
    use resource_store::InMemoryStore;

    const MANIFEST: &str = r#"
nodes:
  - name: node1
  - name: node2
    labels:
      gpu: "true"
resources:
  - name: legacy
    labels:
      app: x
workloads:
  - name: a
    selector: app=x
    template:
      labels:
        app: x
    placement:
      type: Replicated
      replicas: 2
  - name: b
    namespace: default
    selector:
      matchLabels:
        app: x
    template:
      labels:
        app: x
    placement:
      type: PerNode
      nodeSelector: gpu
services:
  - name: x
    selector: app in (x)
"#;

    #[test]
    fn test_parse_both_selector_spellings() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();
        assert_eq!(manifest.nodes.len(), 2);
        assert_eq!(manifest.resources[0].namespace, DEFAULT_NAMESPACE);

        let a = manifest.workloads[0].to_workload().unwrap();
        let b = manifest.workloads[1].to_workload().unwrap();
        assert_eq!(
            a.spec.selector.match_expressions,
            vec![LabelSelectorRequirement::equals("app", "x")]
        );
        assert_eq!(b.spec.selector, LabelSelector::from_labels([("app", "x")]));
        assert_eq!(
            b.spec.placement,
            Placement::PerNode {
                node_selector: Some(LabelSelector::new().with_requirement(LabelSelectorRequirement::exists("gpu")))
            }
        );

        let service = manifest.services[0].to_service().unwrap();
        assert_eq!(
            service.spec.selector,
            LabelSelector::new().with_requirement(LabelSelectorRequirement::is_in("app", ["x"]))
        );
    }

    #[test]
    fn test_bad_selector_string() {
        let entry = ServiceEntry {
            name: "x".to_string(),
            namespace: None,
            selector: SelectorSource::Expression("app in x".to_string()),
        };
        assert!(matches!(entry.to_service(), Err(ControllerError::Selector(_))));
    }

    #[tokio::test]
    async fn test_apply_seeds_store() {
        let store = InMemoryStore::new();
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();

        let summary = manifest.apply(&store).await.unwrap();
        assert_eq!(
            summary,
            ManifestSummary {
                nodes: 2,
                resources: 1,
                workloads: 2,
                services: 1
            }
        );

        // Re-applying skips what exists
        let again = manifest.apply(&store).await.unwrap();
        assert_eq!(again.workloads, 0);
        assert_eq!(store.list_workloads(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_apply_rejects_inconsistent_workload() {
        let store = InMemoryStore::new();
        let manifest = Manifest::from_yaml(
            r#"
workloads:
  - name: bad
    selector: app=x
    template:
      labels:
        app: y
    placement:
      type: Replicated
      replicas: 1
"#,
        )
        .unwrap();

        let err = manifest.apply(&store).await.unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Store(StoreError::Rejected(ValidationError::TemplateMismatch { .. }))
        ));
    }
}
