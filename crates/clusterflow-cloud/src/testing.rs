//! In-memory provider for tests
//!
//! Resources can be made to depend on each other (deleting a resource fails
//! with `ResourceInUse` while any of its blockers exists) or to fail outright.

use crate::error::{CloudError, Result};
use crate::provider::{CloudProvider, ClusterIdentity};
use crate::resource::{CLUSTER_TAG, CloudResource};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    resources: BTreeMap<String, CloudResource>,
    blockers: HashMap<String, Vec<String>>,
    failures: HashMap<String, String>,
}

pub struct FakeCloud {
    cluster: String,
    state: Mutex<FakeState>,
    delete_delay: Duration,
    delete_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCloud {
    /// Provider whose `add`ed resources belong to cluster `c1`
    pub fn new() -> Self {
        Self::for_cluster("c1")
    }

    pub fn for_cluster(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            state: Mutex::new(FakeState::default()),
            delete_delay: Duration::ZERO,
            delete_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = delay;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a resource tagged for this provider's cluster
    pub fn add(&self, resource: CloudResource) {
        let resource = resource.with_tag(CLUSTER_TAG, self.cluster.clone());
        self.state().resources.insert(resource.key(), resource);
    }

    /// Adds a resource belonging to some other cluster
    pub fn add_foreign(&self, resource: CloudResource) {
        let resource = resource.with_tag(CLUSTER_TAG, format!("not-{}", self.cluster));
        self.state().resources.insert(resource.key(), resource);
    }

    /// `resource` cannot be deleted while `blocker` exists
    pub fn depends_on(&self, resource: &CloudResource, blocker: &CloudResource) {
        self.state()
            .blockers
            .entry(resource.key())
            .or_default()
            .push(blocker.key());
    }

    /// Deleting `resource` fails with a non-retryable error
    pub fn fail_with(&self, resource: &CloudResource, message: impl Into<String>) {
        self.state().failures.insert(resource.key(), message.into());
    }

    pub fn remaining(&self) -> Vec<CloudResource> {
        self.state().resources.values().cloned().collect()
    }

    pub fn contains(&self, resource: &CloudResource) -> bool {
        self.state().resources.contains_key(&resource.key())
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn try_delete(&self, resource: &CloudResource) -> Result<()> {
        let mut state = self.state();
        let key = resource.key();

        if !state.resources.contains_key(&key) {
            return Err(CloudError::ResourceNotFound(key));
        }
        if let Some(message) = state.failures.get(&key) {
            return Err(CloudError::ApiError(message.clone()));
        }
        if let Some(blocker) = state
            .blockers
            .get(&key)
            .and_then(|bs| bs.iter().find(|b| state.resources.contains_key(*b)))
        {
            return Err(CloudError::ResourceInUse(format!(
                "{} is referenced by {}",
                key, blocker
            )));
        }

        state.resources.remove(&key);
        Ok(())
    }
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list_resources(&self, cluster: &ClusterIdentity) -> Result<Vec<CloudResource>> {
        Ok(self
            .state()
            .resources
            .values()
            .filter(|r| r.has_tag(CLUSTER_TAG, &cluster.name))
            .cloned()
            .collect())
    }

    async fn delete_resource(&self, resource: &CloudResource) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delete_delay.is_zero() {
            tokio::time::sleep(self.delete_delay).await;
        }
        let result = self.try_delete(resource);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
