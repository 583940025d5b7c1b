//! Error types for kyrohook.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the failure class: bad input, an unavailable registration store, or a
//! single corrupted record. Delivery failures are `DeliveryError`s and reach
//! callers only through delivery reports.

use thiserror::Error;

use crate::storage::StorageError;
use crate::webhook::WebhookId;

/// Validation errors that occur during input validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Trigger id cannot be empty")]
    EmptyTriggerId,

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    FieldTooLong {
        field: String,
        max_length: usize,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Outcome classes of a failed delivery attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Connection errors, timeouts, 5xx and 429. Retried per policy.
    #[error("Transient delivery failure: {reason}")]
    Transient {
        reason: String,
        status: Option<u16>,
    },

    /// Anything the endpoint will keep rejecting. Never retried.
    #[error("Permanent delivery failure: {reason}")]
    Permanent {
        reason: String,
        status: Option<u16>,
    },

    /// The dispatcher was shut down while the attempt was pending.
    #[error("Delivery aborted by shutdown")]
    Aborted,
}

impl DeliveryError {
    /// Creates a transient failure.
    #[must_use]
    pub fn transient(reason: impl Into<String>, status: Option<u16>) -> Self {
        Self::Transient {
            reason: reason.into(),
            status,
        }
    }

    /// Creates a permanent failure.
    #[must_use]
    pub fn permanent(reason: impl Into<String>, status: Option<u16>) -> Self {
        Self::Permanent {
            reason: reason.into(),
            status,
        }
    }

    /// Returns true if another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// HTTP status returned by the endpoint, if one was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Permanent { status, .. } => *status,
            Self::Aborted => None,
        }
    }
}

/// Top-level error type for kyrohook.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Corrupted credentials for webhook {webhook_id}: {reason}")]
    DataCorruption {
        webhook_id: WebhookId,
        reason: String,
    },

    #[error("Dispatcher is shut down")]
    Closed,

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl HookError {
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

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this is a data corruption error.
    #[must_use]
    pub const fn is_data_corruption(&self) -> bool {
        matches!(self, Self::DataCorruption { .. })
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if this error is retryable.
    ///
    /// A storage failure means nothing was enqueued, so the caller may repeat
    /// the whole dispatch.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false, // Validation errors won't change on retry
            Self::Storage(_) => true,
            Self::DataCorruption { .. } => false,
            Self::Timeout { .. } => true,
            Self::Closed | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for kyrohook operations.
pub type HookResult<T> = Result<T, HookError>;
