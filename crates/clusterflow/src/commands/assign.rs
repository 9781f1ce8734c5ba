use crate::output;
use clusterflow_core::{Cluster, StateStore};
use colored::Colorize;
use std::io::Write;

/// Fills in missing network defaults and zone subnets, then saves
pub async fn handle<W: Write>(out: &mut W, state: &dyn StateStore) -> anyhow::Result<bool> {
    let mut cluster = state.read_cluster_config().await?;
    let before = cluster.clone();

    cluster.perform_assignments()?;

    let changed = cluster != before;
    if changed {
        state.write_cluster_config(&cluster).await?;
        writeln!(out, "{}", "✓ Assignments saved".green())?;
    } else {
        writeln!(out, "{}", "No changes; everything is already assigned".dimmed())?;
    }

    write_zones(out, &cluster)?;
    Ok(changed)
}

/// `ZONE  CIDR` table
pub fn write_zones<W: Write>(out: &mut W, cluster: &Cluster) -> std::io::Result<()> {
    writeln!(out, "Network: {}", cluster.spec.network_cidr)?;
    let rows: Vec<[&str; 2]> = cluster
        .spec
        .zones
        .iter()
        .map(|z| [z.name.as_str(), z.cidr.as_str()])
        .collect();
    output::write_table(out, ["ZONE", "CIDR"], &rows)
}
