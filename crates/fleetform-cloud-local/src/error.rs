//! Local provider error types

use fleetform_cloud::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid attribute '{attribute}': {message}")]
    InvalidAttribute { attribute: String, message: String },

    #[error("Attribute '{0}' cannot be changed in place")]
    ImmutableAttribute(String),

    #[error("Inventory version {0} is not supported")]
    UnsupportedVersion(u32),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<LocalError> for ProviderError {
    fn from(error: LocalError) -> Self {
        match error {
            // Disk contention may clear up on retry
            LocalError::IoError(_) => ProviderError::Transient(error.to_string()),
            _ => ProviderError::Permanent(error.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LocalError>;
