//! Error types for the config check core.
//!
//! This module provides the error hierarchy for every stage of a check:
//! configuration loading, cluster access, validation state, and the
//! result store.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the config check core.
#[derive(Debug, Error)]
pub enum CheckError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Orchestration API errors.
    #[error("Cluster API error: {0}")]
    Cluster(#[from] ClusterError),

    /// Validation state machine errors.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Result store errors.
    #[error("Result store error: {0}")]
    Store(#[from] StoreError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Errors returned by the orchestration API collaborator.
///
/// `AlreadyExists` and `NotFound` are distinguished from every other failure
/// because create and delete paths rely on them for idempotency.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The object already exists.
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Object kind.
        kind: String,
        /// Object name.
        name: String,
    },

    /// The object does not exist.
    #[error("{kind} {name} not found")]
    NotFound {
        /// Object kind.
        kind: String,
        /// Object name.
        name: String,
    },

    /// The API answered with an unexpected status.
    #[error("API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Authentication or authorization failed.
    #[error("API authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// Rate limited by the API server.
    #[error("API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Network error communicating with the API server: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid response from the API server: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Validation state machine errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The workload reported a phase the state machine cannot interpret.
    #[error("Invalid phase '{phase}' of config check pod {name}, unable to validate config")]
    UnexpectedPhase {
        /// Name of the workload.
        name: String,
        /// Reported phase.
        phase: String,
    },

    /// An existing artifact set belongs to different rendered content.
    #[error("Fingerprint {fingerprint} collides with an existing artifact (stored digest {stored}, rendered digest {rendered})")]
    FingerprintCollision {
        /// The colliding fingerprint.
        fingerprint: String,
        /// Digest recorded on the existing artifact.
        stored: String,
        /// Digest of the current rendered config.
        rendered: String,
    },

    /// No verdict was reached before the wait deadline.
    #[error("No verdict for config {fingerprint} after {secs}s")]
    Timeout {
        /// Fingerprint still being checked.
        fingerprint: String,
        /// Configured wait in seconds.
        secs: u64,
    },

    /// A string is not a well-formed fingerprint.
    #[error("Invalid fingerprint '{value}': {reason}")]
    InvalidFingerprint {
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Stored results are corrupted.
    #[error("Stored results are corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("Result serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// Filesystem error while writing results.
    #[error("Result store write failed: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// Stored format version is not supported.
    #[error("Result store version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected version.
        expected: String,
        /// Found version.
        found: String,
    },
}

/// Result type alias for config check operations.
pub type Result<T> = std::result::Result<T, CheckError>;

impl CheckError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Cluster(ClusterError::RateLimited { .. } | ClusterError::NetworkError { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Cluster(ClusterError::RateLimited { retry_after_secs }) => Some(*retry_after_secs),
            Self::Cluster(ClusterError::NetworkError { .. }) => Some(5),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl ClusterError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an already-exists error.
    #[must_use]
    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Returns true for "already exists" conflicts.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns true for "not found" answers.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for failures worth retrying at the transport level.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::NetworkError { .. })
    }
}

impl StoreError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}
