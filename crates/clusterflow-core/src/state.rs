//! Persisted cluster configuration
//!
//! Layout inside the path store:
//!
//! ```text
//! <cluster>/config        cluster document (YAML)
//! <cluster>/secrets/<id>  secrets, see [`CredentialStore`]
//! ```

use crate::error::{ClusterError, Result};
use crate::model::Cluster;
use crate::secrets::CredentialStore;
use crate::vfs::{self, PathStore};
use async_trait::async_trait;
use std::sync::Arc;

const CONFIG_FILE: &str = "config";
const SECRETS_DIR: &str = "secrets";

/// Owner of a cluster's configuration record
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn read_cluster_config(&self) -> Result<Cluster>;

    async fn write_cluster_config(&self, cluster: &Cluster) -> Result<()>;

    /// Removes the configuration record. Removing an absent record succeeds.
    async fn delete_cluster_config(&self) -> Result<()>;
}

/// State store for one cluster on top of a [`PathStore`]
#[derive(Clone)]
pub struct VfsStateStore {
    store: Arc<dyn PathStore>,
    cluster_name: String,
}

impl VfsStateStore {
    pub fn new(store: Arc<dyn PathStore>, cluster_name: impl Into<String>) -> Result<Self> {
        let cluster_name = cluster_name.into();
        if cluster_name.is_empty() || cluster_name.contains('/') || cluster_name.starts_with('.') {
            return Err(ClusterError::config(format!(
                "invalid cluster name: {:?}",
                cluster_name
            )));
        }
        Ok(Self {
            store,
            cluster_name,
        })
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    fn config_path(&self) -> String {
        vfs::join(&self.cluster_name, CONFIG_FILE)
    }

    /// Secret store scoped to this cluster
    pub fn secrets(&self) -> CredentialStore {
        CredentialStore::new(
            self.store.clone(),
            vfs::join(&self.cluster_name, SECRETS_DIR),
        )
    }
}

#[async_trait]
impl StateStore for VfsStateStore {
    async fn read_cluster_config(&self) -> Result<Cluster> {
        let path = self.config_path();
        let data = self.store.read_file(&path).await.map_err(|e| match e {
            ClusterError::NotFound(_) => ClusterError::NotFound(format!(
                "configuration for cluster {:?}",
                self.cluster_name
            )),
            other => other,
        })?;

        let cluster: Cluster = serde_yaml::from_slice(&data).map_err(|e| {
            ClusterError::Serialization(format!("error parsing {:?}: {}", path, e))
        })?;

        tracing::debug!("Loaded configuration for cluster {}", self.cluster_name);
        Ok(cluster)
    }

    async fn write_cluster_config(&self, cluster: &Cluster) -> Result<()> {
        if cluster.name() != self.cluster_name {
            return Err(ClusterError::config(format!(
                "cluster name mismatch: store is for {:?}, document is {:?}",
                self.cluster_name,
                cluster.name()
            )));
        }

        let data = serde_yaml::to_string(cluster)?;
        self.store
            .write_file(&self.config_path(), data.as_bytes())
            .await?;

        tracing::debug!("Saved configuration for cluster {}", self.cluster_name);
        Ok(())
    }

    async fn delete_cluster_config(&self) -> Result<()> {
        match self.store.remove_file(&self.config_path()).await {
            Ok(()) => {
                tracing::info!("Removed configuration for cluster {}", self.cluster_name);
                Ok(())
            }
            Err(ClusterError::NotFound(_)) => {
                tracing::debug!("Configuration for cluster {} already gone", self.cluster_name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ZoneSpec;
    use crate::vfs::{FsPathStore, MemoryPathStore};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_config_save_load_delete() {
        let temp_dir = tempdir().unwrap();
        let store = VfsStateStore::new(
            Arc::new(FsPathStore::new(temp_dir.path())),
            "k8s.example.com",
        )
        .unwrap();

        let mut cluster = Cluster::new("k8s.example.com");
        cluster.spec.zones.push(ZoneSpec::new("us-east-1a"));
        cluster.perform_assignments().unwrap();

        store.write_cluster_config(&cluster).await.unwrap();
        assert!(temp_dir.path().join("k8s.example.com/config").exists());

        let loaded = store.read_cluster_config().await.unwrap();
        assert_eq!(loaded, cluster);

        store.delete_cluster_config().await.unwrap();
        assert!(store.read_cluster_config().await.unwrap_err().is_not_found());

        // idempotent
        store.delete_cluster_config().await.unwrap();
    }

    #[tokio::test]
    async fn test_name_mismatch_is_rejected() {
        let store =
            VfsStateStore::new(Arc::new(MemoryPathStore::new()), "a.example.com").unwrap();
        let err = store
            .write_cluster_config(&Cluster::new("b.example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Config(_)));
    }

    #[tokio::test]
    async fn test_secrets_are_scoped_to_cluster() {
        let backing = Arc::new(MemoryPathStore::new());
        let store = VfsStateStore::new(backing.clone(), "c1").unwrap();

        store.secrets().get_or_create("admin").await.unwrap();

        assert_eq!(backing.read_dir("c1/secrets").await.unwrap(), vec!["admin"]);
        assert_eq!(store.secrets().base(), "c1/secrets");
    }

    #[test]
    fn test_invalid_cluster_name() {
        assert!(VfsStateStore::new(Arc::new(MemoryPathStore::new()), "").is_err());
        assert!(VfsStateStore::new(Arc::new(MemoryPathStore::new()), "a/b").is_err());
    }
}
