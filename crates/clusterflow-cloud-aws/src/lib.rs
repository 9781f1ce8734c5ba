//! AWS provider for ClusterFlow
//!
//! Implements [`CloudProvider`](clusterflow_cloud::CloudProvider) on top of
//! the EC2, classic ELB and Auto Scaling APIs. Every resource a cluster owns
//! carries the `KubernetesCluster=<name>` tag, which is how discovery finds
//! them.
//!
//! # Discovered resource types
//!
//! - `autoscaling-group` (force deleted, which terminates its instances)
//! - `load-balancer` (classic ELB, keyed by name; deletion waits for its
//!   network interfaces to go)
//! - `instance` (anything not yet terminated and not owned by a discovered
//!   autoscaling group)
//! - `volume`
//! - `security-group` (except the VPC default group)
//! - `subnet`
//! - `route-table` (except the VPC main table)
//! - `internet-gateway` (detached before deletion)
//! - `vpc`
//!
//! # Requirements
//!
//! Credentials are resolved by the standard AWS provider chain
//! (`AWS_ACCESS_KEY_ID`, `~/.aws/credentials`, instance profile, ...).
//!
//! # Example
//!
//! ```ignore
//! use clusterflow_cloud::{ClusterIdentity, ResourceInventory};
//! use clusterflow_cloud_aws::AwsCloudProvider;
//! use std::sync::Arc;
//!
//! let provider = AwsCloudProvider::new("us-east-1").await;
//! let inventory = ResourceInventory::new(Arc::new(provider));
//! let resources = inventory.list(&ClusterIdentity::new("k8s.example.com")).await?;
//! ```

pub mod error;
pub mod provider;

pub use error::classify;
pub use provider::AwsCloudProvider;
