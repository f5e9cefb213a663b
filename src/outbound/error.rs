//! Outbound dialing error types

use std::io;

use thiserror::Error;

/// Errors from opening an outbound connection
#[derive(Debug, Error)]
pub enum DialError {
    /// The connect attempt did not complete within the configured timeout
    #[error("connect to {target} timed out after {timeout_ms} ms")]
    Timeout {
        /// Destination that was being dialed
        target: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// The connect attempt failed
    #[error("connect to {target} failed: {source}")]
    Connect {
        /// Destination that was being dialed
        target: String,
        /// Underlying I/O failure
        #[source]
        source: io::Error,
    },

    /// Name resolution produced no addresses
    #[error("no addresses resolved for {target}")]
    NoAddresses {
        /// Destination that was being resolved
        target: String,
    },

    /// A fallback list entry could not be parsed
    #[error("invalid fallback entry '{0}'")]
    InvalidFallback(String),
}

impl DialError {
    /// Create a timeout error
    pub fn timeout(target: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            target: target.into(),
            timeout_ms,
        }
    }

    /// Create a connect error
    pub fn connect(target: impl Into<String>, source: io::Error) -> Self {
        Self::Connect {
            target: target.into(),
            source,
        }
    }
}
