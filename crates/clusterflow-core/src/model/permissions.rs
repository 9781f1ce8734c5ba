//! IAM-style permissions attached to cluster roles

use serde::{Deserialize, Serialize};

const S3_PREFIX: &str = "s3://";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudPermissions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<CloudPermission>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudPermission {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource: String,
}

impl CloudPermissions {
    /// Adds access to a bucket unless it is already granted
    pub fn add_s3_bucket(&mut self, bucket: &str) {
        let resource = format!("{}{}", S3_PREFIX, bucket);
        if self.permissions.iter().any(|p| p.resource == resource) {
            return;
        }
        self.permissions.push(CloudPermission { resource });
    }

    pub fn s3_buckets(&self) -> Vec<String> {
        self.permissions
            .iter()
            .filter_map(|p| p.resource.strip_prefix(S3_PREFIX))
            .map(str::to_string)
            .collect()
    }
}
