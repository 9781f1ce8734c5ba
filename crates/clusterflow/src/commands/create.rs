use clusterflow_core::{Cluster, ClusterError, StateStore, ZoneSpec};
use colored::Colorize;
use std::io::Write;

/// Options for `create cluster`
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub cloud: String,
    pub zones: Vec<String>,
    pub network_cidr: Option<String>,
    pub network_id: Option<String>,
    pub kubernetes_version: Option<String>,
}

/// Writes a new cluster configuration with assignments filled in
pub async fn handle<W: Write>(
    out: &mut W,
    state: &dyn StateStore,
    name: &str,
    options: CreateOptions,
) -> anyhow::Result<Cluster> {
    match state.read_cluster_config().await {
        Ok(_) => anyhow::bail!("cluster {} already exists", name),
        Err(ClusterError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    if options.zones.is_empty() {
        anyhow::bail!("at least one zone is required (--zones)");
    }

    let mut cluster = Cluster::new(name);
    cluster.spec.cloud_provider = options.cloud;
    cluster.spec.zones = options.zones.into_iter().map(ZoneSpec::new).collect();
    cluster.spec.network_cidr = options.network_cidr.unwrap_or_default();
    cluster.spec.network_id = options.network_id.unwrap_or_default();
    cluster.spec.kubernetes_version = options.kubernetes_version.unwrap_or_default();

    // Fails before anything is written if the zones span regions
    let region = cluster.region()?;
    cluster.perform_assignments()?;
    state.write_cluster_config(&cluster).await?;

    writeln!(
        out,
        "{}",
        format!("✓ Created cluster {} in {}", name, region).green()
    )?;
    super::assign::write_zones(out, &cluster)?;
    Ok(cluster)
}
