//! Resource store
//!
//! The single source of truth for resources, nodes, workloads and services.
//! Every write bumps a global revision that subscribers observe through a
//! level-triggered change feed.
//!
//! # Example
//!
//! ```no_run
//! use crds::Resource;
//! use resource_store::{InMemoryStore, Preconditions, ResourceStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryStore::new();
//! let mut changes = store.subscribe();
//!
//! let created = store
//!     .create_resource(Resource::new("default", "rng-1").with_labels([("app", "rng")]))
//!     .await?;
//! changes.changed().await?;
//!
//! // Deletes are delete-if-exists and may be pinned to a version
//! let pinned = Preconditions {
//!     resource_version: Some(created.resource_version),
//!     owner_uid: None,
//! };
//! store.delete_resource("default", "rng-1", pinned).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Conditional writes**: updates and deletes check the resource version at commit
//! - **Owner preconditions**: deletes can require a specific owner UID
//! - **Admission**: workloads and services are validated before they are stored
//! - **Fault injection** (`test-util`): `FaultyStore` scripts transient failures

pub mod error;
pub mod memory;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(feature = "test-util")]
pub mod faulty;

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use store_trait::{Preconditions, ResourceStore};
#[cfg(feature = "test-util")]
pub use faulty::{FaultKind, FaultyStore, Operation};
