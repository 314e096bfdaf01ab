use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Classification every backend error is mapped into before the retry policy
/// sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Throttled,
    Unavailable,
    AuthFailure,
    NotFound,
    Malformed,
    Unknown,
}

impl ErrorKind {
    /// Throttling and unavailability are retried; everything else propagates.
    pub const fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Throttled | ErrorKind::Unavailable)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Throttled => "throttled",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::AuthFailure => "auth failure",
            ErrorKind::NotFound => "not found",
            ErrorKind::Malformed => "malformed",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by one backend call, before any retry decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: ErrorKind,
    pub message: String,
    /// Server-supplied wait before the next attempt, if any.
    pub retry_after: Option<Duration>,
}

impl BackendError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Throttled, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn auth_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthFailure, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Malformed, message)
    }
}

/// Error surfaced by the access layer once its retry policy is done.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("{operation}: still throttled after {attempts} attempts")]
    Throttled { operation: String, attempts: u32 },
    #[error("{operation}: service unavailable after {attempts} attempts")]
    Unavailable { operation: String, attempts: u32 },
    #[error("{operation}: authentication failed: {message}")]
    AuthFailure { operation: String, message: String },
    #[error("{operation}: not found: {message}")]
    NotFound { operation: String, message: String },
    #[error("{operation}: malformed request: {message}")]
    Malformed { operation: String, message: String },
    #[error("{operation}: {message}")]
    Unknown { operation: String, message: String },
}

impl AccessError {
    pub(crate) fn exhausted(operation: &str, kind: ErrorKind, attempts: u32) -> Self {
        let operation = operation.to_string();
        match kind {
            ErrorKind::Throttled => AccessError::Throttled {
                operation,
                attempts,
            },
            _ => AccessError::Unavailable {
                operation,
                attempts,
            },
        }
    }

    pub(crate) fn immediate(operation: &str, err: BackendError) -> Self {
        let operation = operation.to_string();
        let message = err.message;
        match err.kind {
            ErrorKind::Throttled => AccessError::Throttled {
                operation,
                attempts: 1,
            },
            ErrorKind::Unavailable => AccessError::Unavailable {
                operation,
                attempts: 1,
            },
            ErrorKind::AuthFailure => AccessError::AuthFailure { operation, message },
            ErrorKind::NotFound => AccessError::NotFound { operation, message },
            ErrorKind::Malformed => AccessError::Malformed { operation, message },
            ErrorKind::Unknown => AccessError::Unknown { operation, message },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::Throttled { .. } => ErrorKind::Throttled,
            AccessError::Unavailable { .. } => ErrorKind::Unavailable,
            AccessError::AuthFailure { .. } => ErrorKind::AuthFailure,
            AccessError::NotFound { .. } => ErrorKind::NotFound,
            AccessError::Malformed { .. } => ErrorKind::Malformed,
            AccessError::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    pub fn operation(&self) -> &str {
        match self {
            AccessError::Throttled { operation, .. }
            | AccessError::Unavailable { operation, .. }
            | AccessError::AuthFailure { operation, .. }
            | AccessError::NotFound { operation, .. }
            | AccessError::Malformed { operation, .. }
            | AccessError::Unknown { operation, .. } => operation,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AccessError::NotFound { .. })
    }
}
