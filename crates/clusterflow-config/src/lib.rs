//! Locating the ClusterFlow state store
//!
//! The state store root is resolved in this order:
//! 1. An explicit location (the CLI's `--state` flag)
//! 2. The `CLUSTERFLOW_STATE_STORE` environment variable
//! 3. `~/.config/clusterflow/state`

pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// Environment variable naming the state store root
pub const STATE_STORE_ENV: &str = "CLUSTERFLOW_STATE_STORE";

/// Environment variable naming the cluster to operate on
pub const CLUSTER_NAME_ENV: &str = "CLUSTERFLOW_CLUSTER_NAME";

const FILE_SCHEME: &str = "file://";

/// ClusterFlow's config directory, created if missing
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("clusterflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Default state store root under the config directory
pub fn default_state_dir() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("state"))
}

/// Resolves the state store root and makes sure it exists
pub fn resolve_state_dir(explicit: Option<&str>) -> Result<PathBuf> {
    let from_env = std::env::var(STATE_STORE_ENV).ok();

    let dir = match explicit.or(from_env.as_deref()) {
        Some(location) => parse_location(location)?,
        None => default_state_dir()?,
    };

    if !dir.exists() {
        tracing::debug!("Creating state store directory {}", dir.display());
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

/// Accepts a bare path or a `file://` URL
fn parse_location(location: &str) -> Result<PathBuf> {
    let location = location.trim();
    if location.is_empty() {
        return Err(ConfigError::EmptyStateStore);
    }

    if let Some(path) = location.strip_prefix(FILE_SCHEME) {
        if path.is_empty() {
            return Err(ConfigError::EmptyStateStore);
        }
        return Ok(Path::new(path).to_path_buf());
    }
    if location.contains("://") {
        return Err(ConfigError::UnsupportedStateStore(location.to_string()));
    }
    Ok(PathBuf::from(location))
}
