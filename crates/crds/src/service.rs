//! Service CRD
//!
//! A service is a selector plus a derived endpoint set. Membership is governed
//! only by selector match; ownership plays no part.

use kube::CustomResource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::references::ObjectKey;
use crate::resource::DEFAULT_NAMESPACE;
use crate::selector::LabelSelector;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "herd.dev",
    version = "v1alpha1",
    kind = "Service",
    shortname = "hsvc",
    namespaced,
    status = "ServiceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Resources whose labels match become endpoints
    pub selector: LabelSelector,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// Names of the matching resources, sorted
    #[serde(default)]
    pub endpoints: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Service {
    pub fn name(&self) -> String {
        self.name_any()
    }

    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace_or_default(), self.name())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.metadata.name.as_deref().is_none_or(str::is_empty) {
            return Err(ValidationError::MissingName("Service"));
        }
        self.spec.selector.validate()
    }

    /// Current endpoint names as recorded in status.
    pub fn endpoints(&self) -> &[String] {
        self.status.as_ref().map(|s| s.endpoints.as_slice()).unwrap_or_default()
    }
}
