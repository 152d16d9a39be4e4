use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the distributor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Configuration not found: {0}")]
    NotFound(String),

    #[error("Version {version} not found for {key}")]
    VersionNotFound { key: String, version: u64 },

    #[error("Conflicting publish: {0}")]
    Conflict(String),

    #[error("Snapshot store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid config repository: {0}")]
    InvalidRepository(String),
}

impl ConfigError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ConfigError::NotFound(_) | ConfigError::VersionNotFound { .. }
        )
    }
}

/// Errors raised by snapshot store implementations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Version conflict on {key}: expected {expected}, next is {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store corrupted: {0}")]
    Corrupted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for ConfigError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => ConfigError::Conflict(err.to_string()),
            other => ConfigError::StoreUnavailable(other.to_string()),
        }
    }
}
