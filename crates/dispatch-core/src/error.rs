//! Error types for dispatch-core.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while building entities or loading configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An entity attribute is outside its valid domain.
    #[error("invalid {entity} attribute '{field}': {reason}")]
    InvalidAttribute {
        /// Entity kind ("courier" or "order").
        entity: &'static str,
        /// Offending attribute.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
