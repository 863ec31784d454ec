//! Workload Controller
//!
//! Drives two kinds of objects against a shared resource store:
//! - Workload: keeps a desired number of owned, selector-matching resources,
//!   either a fixed replica count or one per eligible node
//! - Service: publishes the names of all resources its selector matches
//!
//! Both are level-triggered. Each object gets its own loop that wakes on any
//! store change, re-reads the latest state and converges towards it.

pub mod backoff;
pub mod config;
pub mod controller;
pub mod error;
pub mod manifest;
pub mod metrics;
pub mod migration;
pub mod reconciler;
pub mod retry;
pub mod server;
pub mod watcher;

#[cfg(test)]
mod test_utils;

pub use config::ControllerConfig;
pub use controller::Controller;
pub use error::ControllerError;
pub use manifest::Manifest;
pub use metrics::Metrics;
pub use migration::{relabel_resource, transfer_ownership, LabelChanges};
pub use reconciler::{Action, Reconciler};
pub use retry::RetryPolicy;
pub use watcher::Watcher;
