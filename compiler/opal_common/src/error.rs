//! Error types for the Opal backend.
//!
//! The backend assumes well-formed IR; ill-formed input is a front-end bug
//! and aborts via panics. The recoverable surface is limited to I/O during
//! emission, unsupported target configurations, and SSA text parsing.

use thiserror::Error;

/// The error type for backend operations.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported target: {message}")]
    UnsupportedTarget { message: String },

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

impl BackendError {
    pub fn unsupported_target(message: impl Into<String>) -> Self {
        Self::UnsupportedTarget {
            message: message.into(),
        }
    }

    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
