//! Object identity and owner references
//!
//! Ownership is established once, when a workload creates a resource, and is
//! never re-derived from selector matches. Two workloads with identical
//! selectors therefore keep disjoint sets of owned resources.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Exclusive-creation relationship between a resource and the workload that created it.
///
/// Only the workload identified by `uid` may delete or otherwise mutate the resource.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// Kind of the owner (e.g. "Workload")
    pub kind: String,

    /// Name of the owner
    pub name: String,

    /// UID of the owner; a recreated workload with the same name gets a new UID
    /// and does not inherit the previous workload's resources
    pub uid: String,
}

impl OwnerReference {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            uid: uid.into(),
        }
    }
}

impl fmt::Display for OwnerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.kind, self.name, self.uid)
    }
}

/// Namespaced object key, rendered as `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
