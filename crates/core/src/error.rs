//! Core error types

use thiserror::Error;

/// Errors raised while publishing or reading the attestor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No configuration has been published yet
    #[error("not configured")]
    NotConfigured,

    /// Configuration document was blank
    #[error("configuration cannot be empty")]
    Empty,

    /// Configuration document could not be decoded or failed validation
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
