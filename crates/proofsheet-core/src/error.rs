//! Error types module
//!
//! Every failure inside the upload pipeline is expressed as a [`PipelineError`].
//! Errors are captured per item and never escape the scheduler; the variant
//! decides whether the retry helper may try again and how the failure is
//! surfaced to the caller.

use crate::models::ErrorKind;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected outcomes like caller cancellation
    Debug,
    /// Warning level - for conditions the caller is expected to act on
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be handled and presented.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "QUOTA_EXCEEDED")
    fn error_code(&self) -> &'static str;

    /// Whether this error may be retried automatically by the backoff helper
    fn is_recoverable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Source file unreadable: {0}")]
    Source(String),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Upload failed: {message}")]
    Upload { message: String, transient: bool },

    #[error("Upload quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Pipeline has been destroyed")]
    Destroyed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Upload failure that is worth retrying (network error, 5xx, throttling).
    pub fn transient(message: impl Into<String>) -> Self {
        PipelineError::Upload {
            message: message.into(),
            transient: true,
        }
    }

    /// Upload failure that will fail the same way on retry (4xx, bad payload).
    pub fn permanent(message: impl Into<String>) -> Self {
        PipelineError::Upload {
            message: message.into(),
            transient: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }

    /// Item-level classification recorded on a failed [`PipelineItem`](crate::PipelineItem).
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            PipelineError::Source(_) => Some(ErrorKind::Source),
            PipelineError::Compression(_) => Some(ErrorKind::Compression),
            PipelineError::Upload { .. } => Some(ErrorKind::Upload),
            PipelineError::QuotaExceeded(_) => Some(ErrorKind::QuotaExceeded),
            PipelineError::Cancelled => Some(ErrorKind::Cancelled),
            PipelineError::Destroyed
            | PipelineError::InvalidConfig(_)
            | PipelineError::Internal(_) => None,
        }
    }
}

impl ErrorMetadata for PipelineError {
    fn error_code(&self) -> &'static str {
        match self {
            PipelineError::Source(_) => "SOURCE_UNREADABLE",
            PipelineError::Compression(_) => "COMPRESSION_FAILED",
            PipelineError::Upload {
                transient: true, ..
            } => "UPLOAD_TRANSIENT",
            PipelineError::Upload { .. } => "UPLOAD_FAILED",
            PipelineError::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            PipelineError::Cancelled => "CANCELLED",
            PipelineError::Destroyed => "PIPELINE_DESTROYED",
            PipelineError::InvalidConfig(_) => "INVALID_CONFIG",
            PipelineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::Upload {
                transient: true,
                ..
            }
        )
    }

    fn log_level(&self) -> LogLevel {
        match self {
            PipelineError::Cancelled => LogLevel::Debug,
            PipelineError::QuotaExceeded(_) | PipelineError::Destroyed => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}
