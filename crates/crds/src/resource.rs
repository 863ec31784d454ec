//! Managed resources (the analogue of pods)

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::references::{ObjectKey, OwnerReference};
use crate::selector::{LabelSelector, LabelSet};

/// Namespace used when an object does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Kind given to resources created from a template that does not name one.
pub const DEFAULT_RESOURCE_KIND: &str = "Pod";

pub(crate) fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

pub(crate) fn default_resource_kind() -> String {
    DEFAULT_RESOURCE_KIND.to_string()
}

/// A labeled entity held by the resource store.
///
/// `uid`, `resource_version` and `created_at` are assigned by the store; values
/// supplied on create are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub name: String,

    #[serde(default = "default_resource_kind")]
    pub kind: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Mutable labels; selectors are evaluated against these
    #[serde(default)]
    pub labels: LabelSet,

    /// Workload that created this resource, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerReference>,

    /// Node the resource is bound to (set for per-node placement)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,

    /// Opaque payload copied from the template
    #[serde(default)]
    pub spec: serde_json::Value,

    #[serde(default)]
    pub uid: String,

    #[serde(default)]
    pub resource_version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: default_resource_kind(),
            namespace: namespace.into(),
            labels: LabelSet::new(),
            owner: None,
            node_name: None,
            spec: serde_json::Value::Null,
            uid: String::new(),
            resource_version: 0,
            created_at: None,
        }
    }

    pub fn with_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels = labels.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_node(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = Some(node_name.into());
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    /// True if this resource was created by the owner with the given UID.
    pub fn is_owned_by(&self, owner_uid: &str) -> bool {
        self.owner.as_ref().is_some_and(|o| o.uid == owner_uid)
    }

    pub fn matches(&self, selector: &LabelSelector) -> bool {
        selector.matches(&self.labels)
    }
}
