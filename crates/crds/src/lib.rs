//! Herd data model
//!
//! Labels, selectors and the objects they are evaluated against:
//! - `Resource`: a labeled managed entity (pod analogue)
//! - `Node`: placement target for per-node workloads
//! - `Workload` CRD: keeps a desired number of owned resources
//! - `Service` CRD: projects the set of resources matching a selector

pub mod error;
pub mod node;
pub mod references;
pub mod resource;
pub mod selector;
pub mod service;
pub mod workload;

pub use error::*;
pub use node::*;
pub use references::*;
pub use resource::{Resource, DEFAULT_NAMESPACE, DEFAULT_RESOURCE_KIND};
pub use selector::*;
pub use service::*;
pub use workload::*;
