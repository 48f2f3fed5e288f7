//! Error types for triage runs
//!
//! Errors are classified by blast radius:
//! - Per-message: metadata extraction, content analysis, a crashed worker
//!   task (skip or fall back)
//! - Retryable: content-service timeouts and transport failures
//! - Persistence: snapshot reads/writes (degrade, never abort)

use std::path::PathBuf;
use thiserror::Error;

/// Error types for identity, importance, tracking and scoring work
#[derive(Debug, Error)]
pub enum TriageError {
    // Per-message errors
    #[error("Message metadata unavailable: {0}")]
    Metadata(String),

    #[error("Content analysis failed: {0}")]
    ContentService(String),

    #[error("Content analysis timed out after {0} seconds")]
    ContentTimeout(u64),

    // Persistence errors
    #[error("Snapshot I/O error at {path}: {message}")]
    Snapshot { path: PathBuf, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    // Setup errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data directory not found: {0}")]
    DataDirNotFound(PathBuf),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl TriageError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TriageError::ContentService(_) | TriageError::ContentTimeout(_)
        )
    }

    /// Returns true if this error only costs one message, never the batch
    pub fn is_per_message(&self) -> bool {
        matches!(
            self,
            TriageError::Metadata(_)
                | TriageError::ContentService(_)
                | TriageError::ContentTimeout(_)
                | TriageError::Worker(_)
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            TriageError::Metadata(_) => "The message was skipped. It will be retried next run.",
            TriageError::ContentService(_) => {
                "Check the content analysis service. Rule-based analysis was used instead."
            }
            TriageError::ContentTimeout(_) => {
                "The content service is slow. Raise content_timeout_secs or try again."
            }
            TriageError::Snapshot { .. } => {
                "Check permissions on the data directory. The previous snapshot was kept."
            }
            TriageError::Serialization(_) => "The snapshot format is invalid. It will be rebuilt.",
            TriageError::Io(_) => "Check file permissions and disk space.",
            TriageError::Configuration(_) => "Check config.json. Defaults were used.",
            TriageError::DataDirNotFound(_) => "Create the data directory or set a different one.",
            TriageError::Worker(_) => "A worker task stopped unexpectedly. The message was skipped.",
        }
    }
}

impl From<std::io::Error> for TriageError {
    fn from(err: std::io::Error) -> Self {
        TriageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TriageError {
    fn from(err: serde_json::Error) -> Self {
        TriageError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;
