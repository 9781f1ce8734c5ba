use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found; set CLUSTERFLOW_STATE_STORE or pass --state")]
    ConfigDirNotFound,

    #[error("Unsupported state store location {0}; only local paths and file:// are supported")]
    UnsupportedStateStore(String),

    #[error("State store location is empty")]
    EmptyStateStore,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
