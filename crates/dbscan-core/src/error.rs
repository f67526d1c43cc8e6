//! Error types for dbscan.
//!
//! Scanner errors are fatal to a single scan attempt, validation and
//! registration errors are per-path and never abort a batch.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the dbscan library.
#[derive(Debug, Error)]
pub enum ScanError {
    // Scanner errors
    #[error("sqlite-scanner binary not found at {binary}")]
    ScannerUnavailable { binary: PathBuf },

    #[error("sqlite-scanner failed: {stderr}")]
    ScannerFailed {
        /// Exit code, if the process exited normally
        status: Option<i32>,
        stderr: String,
    },

    #[error("sqlite-scanner produced invalid output {line:?}: {message}")]
    ScannerOutput { line: String, message: String },

    #[error("sqlite-scanner timed out after {0:?}")]
    ScanTimeout(Duration),

    #[error("Scan cancelled")]
    ScanCancelled,

    // Per-path errors
    #[error("{reason}")]
    ValidationSkip { path: String, reason: String },

    #[error("Database name {name:?} is already used by {existing}, cannot add {path}")]
    RegistrationConflict {
        name: String,
        existing: String,
        path: String,
    },

    #[error("Database not found: {name}")]
    DatabaseNotFound { name: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for dbscan operations.
pub type Result<T> = std::result::Result<T, ScanError>;

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for ScanError {
    fn from(err: rusqlite::Error) -> Self {
        ScanError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<crate::cancel::CancelledError> for ScanError {
    fn from(_: crate::cancel::CancelledError) -> Self {
        ScanError::ScanCancelled
    }
}

impl ScanError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ScanError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether this error must stop a one-shot run with a non-zero exit.
    ///
    /// Continuous mode logs every error and keeps ticking instead.
    pub fn is_fatal_for_one_shot(&self) -> bool {
        matches!(
            self,
            ScanError::ScannerUnavailable { .. }
                | ScanError::ScannerFailed { .. }
                | ScanError::ScannerOutput { .. }
                | ScanError::ScanTimeout(_)
        )
    }

    /// HTTP status code the serving engine should answer with.
    pub fn to_http_status(&self) -> u16 {
        match self {
            ScanError::DatabaseNotFound { .. } => 404,
            _ => 500,
        }
    }
}
