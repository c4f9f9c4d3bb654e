//! Error types for the Sift telemetry core.
//!
//! Most failures in the delivery pipeline are handled where they happen and
//! only logged: bad configuration, corrupt snapshots, transport failures and
//! rejected uploads never reach the code that recorded an event. The
//! [`Error`] type here covers the few conditions a caller must see, chiefly
//! misuse of the session API.
//!
//! Every variant carries a stable numeric code, grouped by category:
//! - 10-19: Configuration errors
//! - 20-29: Queue errors
//! - 30-39: Session errors
//! - 40-49: Durable store errors
//! - 60-69: I/O and serialization errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Sift operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Session configuration errors.
    Config,
    /// Event queue management errors.
    Queue,
    /// Session lifecycle errors.
    Session,
    /// Durable key-value store errors.
    Store,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Queue => write!(f, "queue"),
            ErrorCategory::Session => write!(f, "session"),
            ErrorCategory::Store => write!(f, "store"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified caller-visible error type.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    // Queue errors (20-29)
    #[error("queue already exists: {identifier}")]
    QueueExists { identifier: String },

    #[error("queue not found: {identifier}")]
    QueueNotFound { identifier: String },

    // Session errors (30-39)
    #[error("session is closed")]
    SessionClosed,

    #[error("session is already open")]
    SessionAlreadyOpen,

    #[error("session is not open")]
    SessionNotOpen,

    // Store errors (40-49)
    #[error("durable store error: {0}")]
    Store(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::QueueExists { .. } => 20,
            Error::QueueNotFound { .. } => 21,
            Error::SessionClosed => 30,
            Error::SessionAlreadyOpen => 31,
            Error::SessionNotOpen => 32,
            Error::Store(_) => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Config,
            Error::QueueExists { .. } | Error::QueueNotFound { .. } => ErrorCategory::Queue,
            Error::SessionClosed | Error::SessionAlreadyOpen | Error::SessionNotOpen => {
                ErrorCategory::Session
            }
            Error::Store(_) => ErrorCategory::Store,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether this error points at a bug in the calling code rather than a
    /// transient condition.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Error::QueueExists { .. }
                | Error::SessionAlreadyOpen
                | Error::SessionNotOpen
                | Error::SessionClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_grouped_by_category() {
        let errors = vec![
            Error::Config("x".into()),
            Error::QueueExists {
                identifier: "a".into(),
            },
            Error::QueueNotFound {
                identifier: "a".into(),
            },
            Error::SessionClosed,
            Error::SessionAlreadyOpen,
            Error::SessionNotOpen,
            Error::Store("x".into()),
            Error::Io(std::io::Error::other("x")),
        ];
        for err in errors {
            let expected = match err.category() {
                ErrorCategory::Config => 10..20,
                ErrorCategory::Queue => 20..30,
                ErrorCategory::Session => 30..40,
                ErrorCategory::Store => 40..50,
                ErrorCategory::Io => 60..70,
            };
            assert!(expected.contains(&err.code()), "{err} -> {}", err.code());
        }
    }

    #[test]
    fn test_queue_exists_is_usage_error() {
        let err = Error::QueueExists {
            identifier: "device-properties".into(),
        };
        assert!(err.is_usage_error());
        assert_eq!(err.to_string(), "queue already exists: device-properties");
        assert!(!Error::Store("disk full".into()).is_usage_error());
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Queue.to_string(), "queue");
        assert_eq!(
            serde_json::to_string(&ErrorCategory::Store).unwrap(),
            "\"store\""
        );
    }
}
