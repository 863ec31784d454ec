//! Workload CRD
//!
//! A workload keeps a desired number of owned resources matching its selector.
//! The placement variant decides the cardinality:
//! - `Replicated`: a fixed replica count (Deployment-like)
//! - `PerNode`: one resource per eligible node (DaemonSet-like)
//!
//! The variant is fixed for the lifetime of the workload. Moving from one
//! variant to the other means creating a second workload and transferring
//! ownership of resources explicitly.

use kube::CustomResource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::references::{ObjectKey, OwnerReference};
use crate::resource::{default_resource_kind, DEFAULT_NAMESPACE};
use crate::selector::{format_labels, LabelSelector, LabelSet};

/// Kind string recorded in owner references of resources created by a workload.
pub const WORKLOAD_KIND: &str = "Workload";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "herd.dev",
    version = "v1alpha1",
    kind = "Workload",
    shortname = "wl",
    namespaced,
    status = "WorkloadStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    /// Selector used to account for owned resources
    pub selector: LabelSelector,

    /// Template stamped out for every new resource
    pub template: ResourceTemplate,

    /// Cardinality strategy (immutable)
    pub placement: Placement,
}

/// Desired shape of a resource created by a workload.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    /// Kind of the created resources
    #[serde(default = "default_resource_kind")]
    pub kind: String,

    /// Labels copied onto every created resource; must satisfy the workload selector
    #[serde(default)]
    pub labels: LabelSet,

    /// Opaque payload copied onto every created resource
    #[serde(default)]
    pub spec: serde_json::Value,
}

impl ResourceTemplate {
    pub fn with_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            kind: default_resource_kind(),
            labels: labels.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            spec: serde_json::Value::Null,
        }
    }
}

/// Cardinality strategy of a workload.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "PascalCase")]
pub enum Placement {
    /// Keep `replicas` resources regardless of node count
    #[serde(rename_all = "camelCase")]
    Replicated { replicas: u32 },

    /// Keep exactly one resource on every eligible node
    #[serde(rename_all = "camelCase")]
    PerNode {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_selector: Option<LabelSelector>,
    },
}

impl Placement {
    pub fn variant(&self) -> &'static str {
        match self {
            Self::Replicated { .. } => "Replicated",
            Self::PerNode { .. } => "PerNode",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    pub phase: WorkloadPhase,

    /// Desired cardinality computed during the last reconciliation
    pub desired: u32,

    /// Owned resources that still match the selector
    pub current: u32,

    /// Set when transient store errors exhausted their retries
    #[serde(default)]
    pub degraded: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Generation of the spec this status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Workload lifecycle phase
///
/// Serializes as PascalCase ("Stable", "Failed", etc.) but also accepts lowercase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum WorkloadPhase {
    /// Admitted, not reconciled yet
    #[default]
    #[serde(alias = "pending")]
    Pending,

    /// Observed state differs from desired state, or the last attempt failed transiently
    #[serde(alias = "reconciling")]
    Reconciling,

    /// Owned count equals desired count
    #[serde(alias = "stable")]
    Stable,

    /// Configuration error; nothing will be created until the spec is fixed
    #[serde(alias = "failed")]
    Failed,
}

impl WorkloadSpec {
    /// Check selector well-formedness and template/selector self-consistency.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.selector.validate()?;
        if let Placement::PerNode {
            node_selector: Some(node_selector),
        } = &self.placement
        {
            node_selector.validate()?;
        }
        if !self.selector.matches(&self.template.labels) {
            return Err(ValidationError::TemplateMismatch {
                selector: self.selector.to_string(),
                labels: format_labels(&self.template.labels),
            });
        }
        Ok(())
    }
}

impl Workload {
    pub fn name(&self) -> String {
        self.name_any()
    }

    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace_or_default(), self.name())
    }

    /// Admission check for a new workload.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.metadata.name.as_deref().is_none_or(str::is_empty) {
            return Err(ValidationError::MissingName(WORKLOAD_KIND));
        }
        self.spec.validate()
    }

    /// Admission check for an update of `previous` into `self`.
    pub fn validate_update(&self, previous: &Workload) -> Result<(), ValidationError> {
        self.validate()?;
        let (from, to) = (previous.spec.placement.variant(), self.spec.placement.variant());
        if from != to {
            return Err(ValidationError::PlacementChanged {
                name: self.name(),
                from,
                to,
            });
        }
        Ok(())
    }

    /// Owner reference stamped on resources this workload creates.
    ///
    /// `None` until the store has assigned a UID.
    pub fn owner_reference(&self) -> Option<OwnerReference> {
        self.uid()
            .map(|uid| OwnerReference::new(WORKLOAD_KIND, self.name(), uid))
    }
}
