//! Error types for signalhub.
//!
//! All errors are strongly typed using thiserror. Producer-facing
//! validation failures are recoverable and are surfaced as values inside
//! report outcomes; state and stream errors are returned through
//! [`TelemetryResult`] so callers can pattern match on the condition.

use thiserror::Error;

use crate::broadcast::SubscriberId;

/// Validation errors raised while checking untrusted report input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Confidence value {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange {
        value: f32,
    },

    #[error("Source id cannot be empty")]
    EmptySourceId,

    #[error("Source name cannot be empty")]
    EmptySourceName,

    #[error("Record type cannot be empty")]
    EmptyRecordType,

    #[error("Payload for record type '{record_type}' was rejected: {}", errors.join("; "))]
    SchemaRejected {
        record_type: String,
        errors: Vec<String>,
    },
}

/// State errors raised by the source state store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("Source not initialized: {source_id}")]
    NotInitialized {
        source_id: String,
    },
}

/// Stream errors raised by the broadcast hub and subscriber streams.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    #[error("Broadcast hub is closed")]
    HubClosed,

    #[error("Subscriber already registered: {subscriber_id}")]
    DuplicateSubscriber {
        subscriber_id: SubscriberId,
    },

    #[error("Stream disconnected")]
    Disconnected,

    #[error("Stream receive timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Top-level error type for signalhub.
///
/// This enum encompasses all possible errors that can occur when
/// reporting into or reading out of the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelemetryError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl TelemetryError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a state error.
    #[must_use]
    pub const fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// Returns true if this is a stream error.
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if this error names a source that was never initialized.
    #[must_use]
    pub const fn is_not_initialized(&self) -> bool {
        matches!(self, Self::State(StateError::NotInitialized { .. }))
    }

    /// Returns true if retrying the same call can succeed.
    ///
    /// Validation and state errors are deterministic; only stream timeouts
    /// are worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::State(_) => false,
            Self::Stream(e) => matches!(e, StreamError::Timeout { .. }),
            Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for signalhub operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
