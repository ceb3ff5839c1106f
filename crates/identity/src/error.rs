//! Error types for process attestation.
//!
//! Every stage of the pipeline reports its own variant so a caller can tell
//! which stage failed. Nothing here is retried.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use procattest_core::ConfigError;

/// Errors produced while hashing an executable.
#[derive(Debug, Error)]
pub enum DigestError {
    /// File missing or unreadable
    #[error("SHA256 digest: failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File metadata unavailable
    #[error("SHA256 digest: failed to stat {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File is larger than the configured limit
    #[error("SHA256 digest: workload {} exceeds size limit ({size} > {limit})", .path.display())]
    SizeLimitExceeded { path: PathBuf, size: u64, limit: u64 },

    /// Read failed part-way through the file
    #[error("SHA256 digest: failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors that abort an attestation.
#[derive(Debug, Error)]
pub enum AttestError {
    /// Configuration missing or invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// OS identity lookup failed
    #[error("{stage}: {reason}")]
    Resolution { stage: &'static str, reason: String },

    /// Executable digest failed
    #[error(transparent)]
    Digest(#[from] DigestError),

    /// External attestation module unreachable, slow or malformed
    #[error("attestation module: {0}")]
    Fetch(String),

    /// Authorization service unreachable or malformed
    #[error("auth service: {0}")]
    Validation(String),

    /// Authorization service explicitly rejected the attestation data
    #[error("attestation data rejected: {0}")]
    ValidationRejected(String),
}

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotConfigured,
    InvalidConfig,
    EmptyConfig,
    Resolution,
    Digest,
    Fetch,
    Validation,
    ValidationRejected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotConfigured => "not_configured",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::EmptyConfig => "empty_config",
            ErrorKind::Resolution => "resolution_error",
            ErrorKind::Digest => "digest_error",
            ErrorKind::Fetch => "fetch_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::ValidationRejected => "validation_rejected",
        }
    }
}

impl AttestError {
    pub(crate) fn resolution(stage: &'static str, reason: impl ToString) -> Self {
        AttestError::Resolution {
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AttestError::Config(ConfigError::NotConfigured) => ErrorKind::NotConfigured,
            AttestError::Config(ConfigError::Empty) => ErrorKind::EmptyConfig,
            AttestError::Config(ConfigError::Invalid(_)) => ErrorKind::InvalidConfig,
            AttestError::Resolution { .. } => ErrorKind::Resolution,
            AttestError::Digest(_) => ErrorKind::Digest,
            AttestError::Fetch(_) => ErrorKind::Fetch,
            AttestError::Validation(_) => ErrorKind::Validation,
            AttestError::ValidationRejected(_) => ErrorKind::ValidationRejected,
        }
    }
}

/// Result type for attestation operations.
pub type AttestResult<T> = Result<T, AttestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            AttestError::from(ConfigError::NotConfigured).kind(),
            ErrorKind::NotConfigured
        );
        assert_eq!(
            AttestError::resolution("UIDs lookup", "no UIDs for process").kind(),
            ErrorKind::Resolution
        );
        assert_eq!(
            AttestError::ValidationRejected("bad token".into())
                .kind()
                .as_str(),
            "validation_rejected"
        );
    }

    #[test]
    fn test_messages_name_the_stage() {
        let err = AttestError::resolution("GIDs lookup", "no GIDs for process");
        assert_eq!(err.to_string(), "GIDs lookup: no GIDs for process");

        let err = AttestError::from(DigestError::SizeLimitExceeded {
            path: PathBuf::from("/bin/app"),
            size: 500,
            limit: 100,
        });
        assert_eq!(
            err.to_string(),
            "SHA256 digest: workload /bin/app exceeds size limit (500 > 100)"
        );
    }
}
