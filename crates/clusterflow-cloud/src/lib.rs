//! ClusterFlow Cloud Infrastructure
//!
//! This crate provides the cloud provider abstraction for ClusterFlow and
//! the two operations built on it: listing everything a cluster owns and
//! tearing it all down.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 ClusterFlow CLI                  │
//! │             (clusterflow delete cluster)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               clusterflow-cloud                  │
//! │  ┌──────────────────┐  ┌─────────────────────┐  │
//! │  │ResourceInventory │  │   TeardownEngine    │  │
//! │  └────────┬─────────┘  └──────────┬──────────┘  │
//! │  ┌────────▼───────────────────────▼──────────┐  │
//! │  │          trait CloudProvider { ... }       │  │
//! │  └────────────────────────────────────────────┘  │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │  aws provider │
//! └───────────────┘
//! ```

pub mod error;
pub mod inventory;
pub mod provider;
pub mod resource;
pub mod teardown;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use error::{CloudError, Result, TeardownError};
pub use inventory::ResourceInventory;
pub use provider::{CloudProvider, ClusterIdentity};
pub use resource::{CLUSTER_TAG, CloudResource, ResourceRow};
pub use teardown::{TeardownEngine, TeardownOptions, TeardownReport};
