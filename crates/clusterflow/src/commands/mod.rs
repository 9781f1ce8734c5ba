pub mod assign;
pub mod create;
pub mod delete;
pub mod secrets;

use anyhow::Context;
use clusterflow_core::{PathStore, VfsStateStore};
use std::sync::Arc;

/// Opens the state of cluster `name`
pub fn open_state(store: Arc<dyn PathStore>, name: &str) -> anyhow::Result<VfsStateStore> {
    VfsStateStore::new(store, name).with_context(|| format!("cannot open state for {}", name))
}

/// Cluster name from `--name`, which is optional on the command line
pub fn require_name(name: Option<String>) -> anyhow::Result<String> {
    name.filter(|n| !n.is_empty())
        .ok_or_else(|| anyhow::anyhow!("--name is required"))
}
