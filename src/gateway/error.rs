//! Gateway server error types

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop the gateway from starting or running
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The configuration failed validation
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Binding the listen address failed
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that failed to bind
        addr: SocketAddr,
        /// Underlying I/O failure
        #[source]
        source: io::Error,
    },
}

impl GatewayError {
    /// Create a bind error
    pub fn bind(addr: SocketAddr, source: io::Error) -> Self {
        Self::Bind { addr, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let addr: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        let err = GatewayError::bind(addr, io::Error::new(io::ErrorKind::AddrInUse, "in use"));
        assert!(err.to_string().contains("0.0.0.0:8080"));
        assert!(err.to_string().contains("in use"));

        let err = GatewayError::from(ConfigError::Invalid("broken".into()));
        assert!(err.to_string().contains("broken"));
    }
}
