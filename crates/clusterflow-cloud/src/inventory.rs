//! Read-only discovery of a cluster's resources

use crate::error::Result;
use crate::provider::{CloudProvider, ClusterIdentity};
use crate::resource::{CloudResource, sort_resources};
use std::sync::Arc;

/// Lists the resources belonging to a cluster, for preview and teardown
#[derive(Clone)]
pub struct ResourceInventory {
    provider: Arc<dyn CloudProvider>,
}

impl ResourceInventory {
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Self { provider }
    }

    /// Resources tagged for `cluster`, ordered by type then id.
    ///
    /// Never mutates provider state.
    pub async fn list(&self, cluster: &ClusterIdentity) -> Result<Vec<CloudResource>> {
        let mut resources = self.provider.list_resources(cluster).await?;
        sort_resources(&mut resources);
        resources.dedup_by(|a, b| a.resource_type == b.resource_type && a.id == b.id);

        tracing::debug!(
            "Found {} resources for cluster {} via {}",
            resources.len(),
            cluster,
            self.provider.name()
        );
        Ok(resources)
    }
}
