//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unsupported address family for network CIDR: {0}")]
    UnsupportedAddressFamily(String),

    #[error("Storage error at {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Corrupt data at {path}: {message}")]
    CorruptData { path: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ClusterError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn storage(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for ClusterError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
