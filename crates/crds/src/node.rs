//! Nodes
//!
//! Node eligibility is an external input: the store reports which nodes exist,
//! their labels, and whether they accept new resources.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::selector::{LabelSelector, LabelSet};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,

    #[serde(default)]
    pub labels: LabelSet,

    /// Cordoned nodes receive no per-node resources
    #[serde(default)]
    pub unschedulable: bool,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: LabelSet::new(),
            unschedulable: false,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn cordoned(mut self) -> Self {
        self.unschedulable = true;
        self
    }

    /// Whether a per-node workload with the given node selector should run here.
    pub fn is_eligible(&self, node_selector: Option<&LabelSelector>) -> bool {
        !self.unschedulable && node_selector.is_none_or(|selector| selector.matches(&self.labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligibility() {
        let gpu = Node::new("node1").with_label("gpu", "true");
        let plain = Node::new("node2");
        let selector = LabelSelector::from_labels([("gpu", "true")]);

        assert!(gpu.is_eligible(None));
        assert!(plain.is_eligible(None));
        assert!(gpu.is_eligible(Some(&selector)));
        assert!(!plain.is_eligible(Some(&selector)));
        assert!(!gpu.cordoned().is_eligible(None));
    }
}
