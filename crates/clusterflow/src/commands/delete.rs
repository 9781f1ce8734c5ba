use crate::output;
use anyhow::Context;
use clusterflow_cloud::{
    CloudProvider, ClusterIdentity, ResourceInventory, TeardownEngine, TeardownOptions,
};
use clusterflow_core::{ClusterError, PathStore, StateStore, VfsStateStore};
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause between deletion passes against a real cloud
const PASS_DELAY: Duration = Duration::from_secs(10);

/// Arguments of `delete cluster`
#[derive(Debug, Clone, Default)]
pub struct DeleteClusterArgs {
    pub name: Option<String>,
    pub yes: bool,
    pub external: bool,
    pub region: Option<String>,
}

/// What to delete and where its configuration lives
pub struct DeleteTarget {
    pub identity: ClusterIdentity,
    pub cloud: String,
    pub state: Option<VfsStateStore>,
}

/// Works out the cluster to delete without touching the cloud.
///
/// `--external` needs a name and region and never reads the state store.
/// Otherwise the stored configuration must exist and carry the same name.
pub async fn resolve_target(
    store: Arc<dyn PathStore>,
    args: &DeleteClusterArgs,
) -> anyhow::Result<DeleteTarget> {
    if args.external {
        let region = args
            .region
            .clone()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| anyhow::anyhow!("--region is required"))?;
        let name = args
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| anyhow::anyhow!("--name is required (when --external)"))?;

        return Ok(DeleteTarget {
            identity: ClusterIdentity::new(name).with_region(region),
            cloud: "aws".to_string(),
            state: None,
        });
    }

    let name = super::require_name(args.name.clone())?;
    let state = VfsStateStore::new(store, name.clone())?;
    let cluster = match state.read_cluster_config().await {
        Ok(cluster) => cluster,
        Err(ClusterError::NotFound(_)) => anyhow::bail!(
            "cluster {} not found in the state store; use --external --region to delete its cloud resources",
            name
        ),
        Err(e) => return Err(e.into()),
    };

    if cluster.name() != name {
        anyhow::bail!("sanity check failed: cluster name mismatch");
    }

    let region = match &args.region {
        Some(region) if !region.is_empty() => region.clone(),
        _ => cluster.region()?,
    };

    Ok(DeleteTarget {
        identity: ClusterIdentity::new(name).with_region(region),
        cloud: cluster.spec.cloud_provider.clone(),
        state: Some(state),
    })
}

/// Builds the provider for `cloud` in `region`
pub async fn build_provider(cloud: &str, region: &str) -> anyhow::Result<Arc<dyn CloudProvider>> {
    match cloud {
        "" | "aws" => aws_provider(region).await,
        other => anyhow::bail!("unsupported cloud provider {:?}", other),
    }
}

#[cfg(feature = "aws-cloud")]
async fn aws_provider(region: &str) -> anyhow::Result<Arc<dyn CloudProvider>> {
    let provider = clusterflow_cloud_aws::AwsCloudProvider::new(region).await;
    Ok(Arc::new(provider))
}

#[cfg(not(feature = "aws-cloud"))]
async fn aws_provider(_region: &str) -> anyhow::Result<Arc<dyn CloudProvider>> {
    anyhow::bail!("built without AWS support; rebuild with the aws-cloud feature")
}

pub async fn handle(
    store: Arc<dyn PathStore>,
    args: DeleteClusterArgs,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let target = resolve_target(store, &args).await?;
    let region = target.identity.region.clone().unwrap_or_default();
    let provider = build_provider(&target.cloud, &region).await?;

    let engine = TeardownEngine::new(provider.clone())
        .with_options(TeardownOptions {
            pass_delay: PASS_DELAY,
            ..Default::default()
        })
        .with_cancellation(cancel);

    let mut stdout = std::io::stdout();
    run(&mut stdout, provider, &target, args.yes, &engine).await
}

/// Preview, confirmation gate, teardown and record removal
pub async fn run<W: Write>(
    out: &mut W,
    provider: Arc<dyn CloudProvider>,
    target: &DeleteTarget,
    yes: bool,
    engine: &TeardownEngine,
) -> anyhow::Result<()> {
    let resources = ResourceInventory::new(provider)
        .list(&target.identity)
        .await
        .context("error listing cluster resources")?;

    if resources.is_empty() {
        writeln!(out, "Nothing to delete")?;
    } else {
        output::write_resources(out, &resources)?;
    }

    if resources.is_empty() && target.state.is_none() {
        writeln!(out)?;
        writeln!(out, "{}", "Cluster deleted".green().bold())?;
        return Ok(());
    }

    if !yes {
        anyhow::bail!("Must specify --yes to delete");
    }

    let state = target.state.as_ref().map(|s| s as &dyn StateStore);
    let report = engine.delete_cluster(resources, state).await?;

    tracing::info!(
        "Deleted {} resources in {} passes",
        report.deleted.len(),
        report.passes
    );
    writeln!(out)?;
    writeln!(out, "{}", "Cluster deleted".green().bold())?;
    Ok(())
}
