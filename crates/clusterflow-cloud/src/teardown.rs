//! Cluster teardown
//!
//! Deletion order between cloud resources is not known up front; it only
//! shows up as `ResourceInUse` errors. The engine therefore deletes in
//! passes: every pass tries every remaining resource, keeps the ones that
//! are still referenced, and starts over until nothing is left. A pass
//! that deletes nothing means no further pass can either, so the engine
//! stops and reports what is left.
//!
//! ```text
//! Listing -> (confirmed by caller) -> Deleting(pass 1..N) -> Succeeded -> ConfigRemoved
//!                                                        \-> Stalled | Fatal | Cancelled
//! ```
//!
//! Nothing is rolled back. Deletion is idempotent and the configuration
//! record is only removed at the very end, so a failed teardown can simply
//! be run again.

use crate::error::{CloudError, TeardownError};
use crate::provider::CloudProvider;
use crate::resource::{CloudResource, sort_resources};
use clusterflow_core::StateStore;
use futures_util::StreamExt;
use futures_util::stream;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Teardown tuning
#[derive(Debug, Clone)]
pub struct TeardownOptions {
    /// Maximum deletions in flight within one pass
    pub concurrency: usize,

    /// Pause between passes, for providers that need time to settle
    pub pass_delay: Duration,
}

impl Default for TeardownOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            pass_delay: Duration::ZERO,
        }
    }
}

/// Outcome of a successful teardown
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    /// Number of deletion passes run
    pub passes: usize,

    /// Resources removed, in the order their deletion completed
    pub deleted: Vec<CloudResource>,

    /// Whether the cluster's configuration record was removed
    pub config_removed: bool,
}

struct PassOutcome {
    deleted: Vec<CloudResource>,
    retry: Vec<CloudResource>,
}

pub struct TeardownEngine {
    provider: Arc<dyn CloudProvider>,
    options: TeardownOptions,
    cancel: CancellationToken,
}

impl TeardownEngine {
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Self {
            provider,
            options: TeardownOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: TeardownOptions) -> Self {
        self.options = options;
        self
    }

    /// Stops the teardown when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Deletes the cluster's resources, then its configuration record.
    ///
    /// The caller is responsible for having confirmed the deletion. The
    /// record is left untouched unless every resource is gone.
    pub async fn delete_cluster(
        &self,
        resources: Vec<CloudResource>,
        state: Option<&dyn StateStore>,
    ) -> Result<TeardownReport, TeardownError> {
        let mut report = self.delete(resources).await?;

        if let Some(state) = state {
            state.delete_cluster_config().await?;
            report.config_removed = true;
        }

        Ok(report)
    }

    /// Deletes `resources` until none are left.
    pub async fn delete(
        &self,
        resources: Vec<CloudResource>,
    ) -> Result<TeardownReport, TeardownError> {
        let mut working = resources;
        sort_resources(&mut working);
        working.dedup_by(|a, b| a.resource_type == b.resource_type && a.id == b.id);

        let mut report = TeardownReport::default();

        while !working.is_empty() {
            if self.cancel.is_cancelled() {
                return Err(TeardownError::Cancelled { remaining: working });
            }

            if report.passes > 0 && !self.options.pass_delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return Err(TeardownError::Cancelled { remaining: working });
                    }
                    _ = tokio::time::sleep(self.options.pass_delay) => {}
                }
            }

            report.passes += 1;
            tracing::info!(
                "Deleting resources, pass {}: {} remaining",
                report.passes,
                working.len()
            );

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::warn!("Teardown cancelled during pass {}", report.passes);
                    return Err(TeardownError::Cancelled { remaining: working });
                }
                outcome = self.run_pass(&working) => outcome?,
            };

            if outcome.deleted.is_empty() {
                tracing::warn!(
                    "Pass {} deleted nothing; {} resources cannot be deleted",
                    report.passes,
                    outcome.retry.len()
                );
                return Err(TeardownError::Stalled {
                    remaining: outcome.retry,
                });
            }

            tracing::info!(
                "Pass {} deleted {} resources",
                report.passes,
                outcome.deleted.len()
            );
            report.deleted.extend(outcome.deleted);
            working = outcome.retry;
        }

        Ok(report)
    }

    /// Attempts every resource once
    async fn run_pass(&self, working: &[CloudResource]) -> Result<PassOutcome, TeardownError> {
        let mut attempts = stream::iter(working.iter().cloned().map(|resource| {
            let provider = self.provider.clone();
            async move {
                let result = provider.delete_resource(&resource).await;
                (resource, result)
            }
        }))
        .buffer_unordered(self.options.concurrency.max(1));

        let mut deleted = Vec::new();

        while let Some((resource, result)) = attempts.next().await {
            match result {
                Ok(()) => {
                    tracing::debug!("Deleted {}", resource);
                    deleted.push(resource);
                }
                Err(CloudError::ResourceNotFound(_)) => {
                    tracing::debug!("{} already deleted", resource);
                    deleted.push(resource);
                }
                Err(CloudError::ResourceInUse(reason)) => {
                    tracing::debug!("{} still in use, will retry: {}", resource, reason);
                }
                Err(source) => {
                    // Dropping the stream cancels deletions still in flight
                    drop(attempts);
                    tracing::error!("Error deleting {}: {}", resource, source);
                    return Err(TeardownError::Fatal {
                        remaining: subtract(working, &deleted),
                        resource,
                        source,
                    });
                }
            }
        }

        Ok(PassOutcome {
            retry: subtract(working, &deleted),
            deleted,
        })
    }
}

fn subtract(working: &[CloudResource], deleted: &[CloudResource]) -> Vec<CloudResource> {
    let gone: HashSet<&CloudResource> = deleted.iter().collect();
    working
        .iter()
        .filter(|r| !gone.contains(r))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCloud;
    use clusterflow_core::{Cluster, MemoryPathStore, VfsStateStore};

    fn sequential() -> TeardownOptions {
        TeardownOptions {
            concurrency: 1,
            ..Default::default()
        }
    }

    async fn state_with_config() -> VfsStateStore {
        let store = VfsStateStore::new(Arc::new(MemoryPathStore::new()), "c1").unwrap();
        store
            .write_cluster_config(&Cluster::new("c1"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_dependency_resolved_on_second_pass() {
        let cloud = Arc::new(FakeCloud::new());
        // Sorted order attempts b before a, so b hits a's reference first
        let a = CloudResource::new("instance", "i-z");
        let b = CloudResource::new("instance", "i-b");
        cloud.add(a.clone());
        cloud.add(b.clone());
        cloud.depends_on(&b, &a);

        let state = state_with_config().await;
        let engine = TeardownEngine::new(cloud.clone()).with_options(sequential());

        let report = engine
            .delete_cluster(vec![a.clone(), b.clone()], Some(&state))
            .await
            .unwrap();

        assert_eq!(report.passes, 2);
        assert_eq!(report.deleted, vec![a, b]);
        assert!(report.config_removed);
        assert!(cloud.remaining().is_empty());
        assert_eq!(cloud.delete_calls(), 3);
        assert!(state.read_cluster_config().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_cycle_stalls_after_one_pass() {
        let cloud = Arc::new(FakeCloud::new());
        let x = CloudResource::new("security-group", "sg-x");
        let y = CloudResource::new("security-group", "sg-y");
        cloud.add(x.clone());
        cloud.add(y.clone());
        cloud.depends_on(&x, &y);
        cloud.depends_on(&y, &x);

        let state = state_with_config().await;
        let engine = TeardownEngine::new(cloud.clone());

        let err = engine
            .delete_cluster(vec![x.clone(), y.clone()], Some(&state))
            .await
            .unwrap_err();

        match &err {
            TeardownError::Stalled { remaining } => assert_eq!(remaining, &vec![x, y]),
            other => panic!("expected stall, got {:?}", other),
        }
        assert_eq!(cloud.delete_calls(), 2);
        assert_eq!(cloud.remaining().len(), 2);
        assert!(state.read_cluster_config().await.is_ok());
        assert!(err.to_string().contains("sg-x"));
    }

    #[tokio::test]
    async fn test_already_absent_resource_counts_as_deleted() {
        let cloud = Arc::new(FakeCloud::new());
        let ghost = CloudResource::new("volume", "vol-gone");
        let engine = TeardownEngine::new(cloud.clone());

        for _ in 0..2 {
            let report = engine.delete(vec![ghost.clone()]).await.unwrap();
            assert_eq!(report.passes, 1);
            assert_eq!(report.deleted, vec![ghost.clone()]);
        }
        assert_eq!(cloud.delete_calls(), 2);
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_and_keeps_config() {
        let cloud = Arc::new(FakeCloud::new());
        let broken = CloudResource::new("instance", "i-broken");
        let waiting = CloudResource::new("subnet", "subnet-1");
        cloud.add(broken.clone());
        cloud.add(waiting.clone());
        cloud.depends_on(&waiting, &broken);
        cloud.fail_with(&broken, "UnauthorizedOperation");

        let state = state_with_config().await;
        let engine = TeardownEngine::new(cloud.clone()).with_options(sequential());

        let err = engine
            .delete_cluster(vec![broken.clone(), waiting.clone()], Some(&state))
            .await
            .unwrap_err();

        match err {
            TeardownError::Fatal {
                resource,
                source,
                remaining,
            } => {
                assert_eq!(resource, broken);
                assert!(matches!(source, CloudError::ApiError(_)));
                assert_eq!(remaining, vec![broken, waiting]);
            }
            other => panic!("expected fatal error, got {:?}", other),
        }
        // instance sorts first; the subnet is never attempted
        assert_eq!(cloud.delete_calls(), 1);
        assert!(state.read_cluster_config().await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_set_removes_config() {
        let cloud = Arc::new(FakeCloud::new());
        let state = state_with_config().await;

        let report = TeardownEngine::new(cloud)
            .delete_cluster(Vec::new(), Some(&state))
            .await
            .unwrap();

        assert_eq!(report.passes, 0);
        assert!(report.config_removed);
        assert!(state.read_cluster_config().await.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cloud = Arc::new(FakeCloud::new());
        let r = CloudResource::new("vpc", "vpc-1");
        cloud.add(r.clone());

        let token = CancellationToken::new();
        token.cancel();

        let err = TeardownEngine::new(cloud.clone())
            .with_cancellation(token)
            .delete(vec![r.clone()])
            .await
            .unwrap_err();

        assert_eq!(err.remaining(), &[r]);
        assert_eq!(cloud.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_during_pass() {
        let cloud = Arc::new(FakeCloud::new().with_delete_delay(Duration::from_secs(30)));
        let r = CloudResource::new("instance", "i-slow");
        cloud.add(r.clone());

        let token = CancellationToken::new();
        let engine = TeardownEngine::new(cloud.clone()).with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let started = std::time::Instant::now();
        let err = engine.delete(vec![r.clone()]).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, TeardownError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(cloud.contains(&r));
    }

    #[tokio::test]
    async fn test_cancelled_while_waiting_between_passes() {
        let cloud = Arc::new(FakeCloud::new());
        // i-a is attempted first and stays in use until i-b is gone
        let a = CloudResource::new("instance", "i-a");
        let b = CloudResource::new("instance", "i-b");
        cloud.add(a.clone());
        cloud.add(b.clone());
        cloud.depends_on(&a, &b);

        let token = CancellationToken::new();
        let engine = TeardownEngine::new(cloud.clone())
            .with_options(TeardownOptions {
                concurrency: 1,
                pass_delay: Duration::from_secs(30),
            })
            .with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let started = std::time::Instant::now();
        let err = engine.delete(vec![a.clone(), b.clone()]).await.unwrap_err();
        canceller.await.unwrap();

        match err {
            TeardownError::Cancelled { remaining } => assert_eq!(remaining, vec![a.clone()]),
            other => panic!("expected cancellation, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(cloud.delete_calls(), 2);
        assert!(cloud.contains(&a));
        assert!(!cloud.contains(&b));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let cloud = Arc::new(FakeCloud::new().with_delete_delay(Duration::from_millis(10)));
        let resources: Vec<CloudResource> = (0..12)
            .map(|i| CloudResource::new("volume", format!("vol-{:02}", i)))
            .collect();
        for r in &resources {
            cloud.add(r.clone());
        }

        let report = TeardownEngine::new(cloud.clone())
            .with_options(TeardownOptions {
                concurrency: 3,
                ..Default::default()
            })
            .delete(resources)
            .await
            .unwrap();

        assert_eq!(report.passes, 1);
        assert_eq!(report.deleted.len(), 12);
        assert!(cloud.max_in_flight() <= 3);
        assert!(cloud.max_in_flight() > 1);
    }

    #[tokio::test]
    async fn test_chain_takes_one_pass_per_link() {
        let cloud = Arc::new(FakeCloud::new());
        // instance blocks subnet blocks vpc; sorted order tries the vpc first
        let vpc = CloudResource::new("a-vpc", "vpc-1");
        let subnet = CloudResource::new("b-subnet", "subnet-1");
        let instance = CloudResource::new("c-instance", "i-1");
        for r in [&vpc, &subnet, &instance] {
            cloud.add(r.clone());
        }
        cloud.depends_on(&vpc, &subnet);
        cloud.depends_on(&subnet, &instance);

        let report = TeardownEngine::new(cloud.clone())
            .with_options(TeardownOptions {
                concurrency: 1,
                pass_delay: Duration::from_millis(1),
            })
            .delete(vec![vpc, subnet, instance])
            .await
            .unwrap();

        assert_eq!(report.passes, 3);
        assert!(cloud.remaining().is_empty());
    }
}
