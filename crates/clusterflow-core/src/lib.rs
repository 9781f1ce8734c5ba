//! ClusterFlow core
//!
//! Cluster document model plus the pieces that need no cloud access:
//!
//! - [`cidr`]: subnet assignment for zones
//! - [`vfs`]: hierarchical byte store with exclusive create
//! - [`secrets`]: idempotent, race-safe secret store
//! - [`state`]: persisted cluster configuration

pub mod cidr;
pub mod error;
pub mod model;
pub mod secrets;
pub mod state;
pub mod vfs;

// Re-exports
pub use error::{ClusterError, Result};
pub use model::{
    CloudPermission, CloudPermissions, Cluster, ClusterSpec, EtcdClusterSpec, EtcdMemberSpec,
    KubeDnsConfig, ObjectMeta, ZoneSpec,
};
pub use secrets::{CredentialStore, Secret};
pub use state::{StateStore, VfsStateStore};
pub use vfs::{FsPathStore, MemoryPathStore, PathStore};
