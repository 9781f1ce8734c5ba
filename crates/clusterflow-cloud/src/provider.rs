//! Cloud provider trait definition

use crate::error::Result;
use crate::resource::CloudResource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Cloud provider abstraction trait
///
/// Providers discover a cluster's resources by tag and delete them one at a
/// time. They report no ordering; dependencies show up as
/// [`CloudError::ResourceInUse`](crate::CloudError::ResourceInUse) when a
/// deletion is attempted too early.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws")
    fn name(&self) -> &str;

    /// Lists every resource tagged as belonging to the cluster.
    ///
    /// Must not modify anything.
    async fn list_resources(&self, cluster: &ClusterIdentity) -> Result<Vec<CloudResource>>;

    /// Deletes a single resource.
    ///
    /// Returns `ResourceNotFound` if it is already gone and `ResourceInUse`
    /// if something still references it.
    async fn delete_resource(&self, resource: &CloudResource) -> Result<()>;
}

/// Which cluster's resources to look for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterIdentity {
    /// Cluster name, matched against the cluster tag
    pub name: String,

    /// Region to search; required when the persisted configuration is not
    /// available to derive it from
    pub region: Option<String>,
}

impl ClusterIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

impl std::fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{} ({})", self.name, region),
            None => write!(f, "{}", self.name),
        }
    }
}
