// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for query execution
//!
//! Driver failures are mapped onto these variants after redaction, so an
//! `EngineError` is always safe to display to a client.

use thiserror::Error;

use crate::sanitize::{classify, redact_sensitive};

/// Recognized families of driver failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Syntax,
    UndefinedObject,
    PermissionDenied,
    Timeout,
    Connection,
    Other,
}

/// Sanitized execution error.
///
/// `Display` yields the client-facing message; [`EngineError::detail`] keeps
/// the redacted driver text for the audit log.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("SQL syntax error in query")]
    SyntaxError { detail: String },

    #[error("Table or column does not exist")]
    UndefinedObject { detail: String },

    #[error("Insufficient database permissions")]
    PermissionDenied { detail: String },

    #[error("Query execution timeout")]
    Timeout { detail: String },

    #[error("Database connection error")]
    ConnectionFailed { detail: String },

    #[error("{detail}")]
    ExecutionError { detail: String },
}

impl EngineError {
    /// Builds an error from a raw driver message and optional SQLSTATE code.
    pub fn from_driver(raw_message: &str, sqlstate: Option<&str>) -> Self {
        let detail = redact_sensitive(raw_message);
        match classify(&detail, sqlstate) {
            ErrorCategory::Syntax => Self::SyntaxError { detail },
            ErrorCategory::UndefinedObject => Self::UndefinedObject { detail },
            ErrorCategory::PermissionDenied => Self::PermissionDenied { detail },
            ErrorCategory::Timeout => Self::Timeout { detail },
            ErrorCategory::Connection => Self::ConnectionFailed { detail },
            ErrorCategory::Other => Self::ExecutionError { detail },
        }
    }

    /// Client-side deadline elapsed before the driver answered.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout {
            detail: format!("no response within {}ms", timeout_ms),
        }
    }

    /// The database could not be reached at all (pool, network, config).
    pub fn connection_failed(raw_message: impl AsRef<str>) -> Self {
        Self::ConnectionFailed {
            detail: redact_sensitive(raw_message.as_ref()),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SyntaxError { .. } => ErrorCategory::Syntax,
            Self::UndefinedObject { .. } => ErrorCategory::UndefinedObject,
            Self::PermissionDenied { .. } => ErrorCategory::PermissionDenied,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::ConnectionFailed { .. } => ErrorCategory::Connection,
            Self::ExecutionError { .. } => ErrorCategory::Other,
        }
    }

    /// Redacted driver text, for server-side logs only.
    pub fn detail(&self) -> &str {
        match self {
            Self::SyntaxError { detail }
            | Self::UndefinedObject { detail }
            | Self::PermissionDenied { detail }
            | Self::Timeout { detail }
            | Self::ConnectionFailed { detail }
            | Self::ExecutionError { detail } => detail,
        }
    }
}

/// Result type alias for execution operations
pub type EngineResult<T> = Result<T, EngineError>;
