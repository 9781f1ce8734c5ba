//! Cloud provider error types

use crate::resource::CloudResource;
use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource in use: {0}")]
    ResourceInUse(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Unsupported resource type: {0}")]
    UnsupportedResource(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Teardown failures. Every variant leaves the configuration record intact.
#[derive(Error, Debug)]
pub enum TeardownError {
    #[error("Not making progress deleting resources; {} remaining: {}", .remaining.len(), describe(.remaining))]
    Stalled { remaining: Vec<CloudResource> },

    #[error("Error deleting {resource}: {source}")]
    Fatal {
        resource: CloudResource,
        #[source]
        source: CloudError,
        remaining: Vec<CloudResource>,
    },

    #[error("Teardown cancelled; {} resources remaining", .remaining.len())]
    Cancelled { remaining: Vec<CloudResource> },

    #[error("Error removing cluster from state store: {0}")]
    State(#[from] clusterflow_core::ClusterError),
}

impl TeardownError {
    /// Resources that may still exist when the teardown stopped
    pub fn remaining(&self) -> &[CloudResource] {
        match self {
            TeardownError::Stalled { remaining }
            | TeardownError::Cancelled { remaining }
            | TeardownError::Fatal { remaining, .. } => remaining,
            TeardownError::State(_) => &[],
        }
    }
}

fn describe(resources: &[CloudResource]) -> String {
    resources
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
