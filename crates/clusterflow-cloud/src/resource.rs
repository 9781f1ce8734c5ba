//! Provider-agnostic description of discovered infrastructure

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag key carrying the owning cluster's name
pub const CLUSTER_TAG: &str = "KubernetesCluster";

/// One piece of infrastructure belonging to a cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CloudResource {
    /// Resource type (e.g., "instance", "security-group", "vpc")
    pub resource_type: String,

    /// Provider-specific resource ID
    pub id: String,

    /// Human readable name, usually the `Name` tag
    pub name: String,

    pub tags: BTreeMap<String, String>,
}

impl CloudResource {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            name: String::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Get the full resource key (type:id)
    pub fn key(&self) -> String {
        format!("{}:{}", self.resource_type, self.id)
    }

    /// Whether the resource carries `key=value`
    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tags.get(key).is_some_and(|v| v == value)
    }

    pub fn row(&self) -> ResourceRow<'_> {
        ResourceRow {
            resource_type: &self.resource_type,
            id: &self.id,
            name: &self.name,
        }
    }
}

impl std::fmt::Display for CloudResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}:{}", self.resource_type, self.id)
        } else {
            write!(f, "{}:{} ({})", self.resource_type, self.id, self.name)
        }
    }
}

/// Preview row: `TYPE`, `ID`, `NAME`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRow<'a> {
    pub resource_type: &'a str,
    pub id: &'a str,
    pub name: &'a str,
}

impl ResourceRow<'_> {
    pub const HEADERS: [&'static str; 3] = ["TYPE", "ID", "NAME"];

    pub fn columns(&self) -> [&str; 3] {
        [self.resource_type, self.id, self.name]
    }
}

/// Sorts resources by type, then id
pub fn sort_resources(resources: &mut [CloudResource]) {
    resources.sort_by(|a, b| {
        a.resource_type
            .cmp(&b.resource_type)
            .then_with(|| a.id.cmp(&b.id))
    });
}
