//! Identity store error types

use thiserror::Error;

/// Errors from identifier parsing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The textual identifier is not a valid 16-byte identifier
    #[error("invalid client identifier: {0}")]
    InvalidId(String),
}

/// Errors from the dynamic key-value backend.
///
/// A backend failure during authorization is logged and treated as a
/// reject, never as an accept.
#[derive(Debug, Error)]
pub enum KvError {
    /// The backend could not be reached
    #[error("key-value backend unavailable: {0}")]
    Unavailable(String),

    /// The backend reached but the operation failed
    #[error("key-value operation failed: {0}")]
    Operation(String),
}

impl KvError {
    /// Create an unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an operation error
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IdentityError::InvalidId("not-a-uuid".into());
        assert!(err.to_string().contains("not-a-uuid"));

        let err = KvError::unavailable("connection refused");
        assert!(err.to_string().contains("connection refused"));

        let err = KvError::operation("write failed");
        assert!(err.to_string().contains("write failed"));
    }
}
