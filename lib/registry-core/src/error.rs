use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Instance not found: {service}/{instance_id}")]
    InstanceNotFound { service: String, instance_id: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl RegistryError {
    pub fn not_found(service: &str, instance_id: &str) -> Self {
        RegistryError::InstanceNotFound {
            service: service.to_string(),
            instance_id: instance_id.to_string(),
        }
    }

    /// Whether the caller should re-register rather than retry
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::InstanceNotFound { .. })
    }
}
