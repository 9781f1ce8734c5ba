//! Cluster data model

mod cluster;
mod permissions;

pub use cluster::*;
pub use permissions::*;
