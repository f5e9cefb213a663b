//! Tunnel session error taxonomy
//!
//! Header-phase errors close the session immediately; dial-phase errors are
//! recovered at most once by the fallback path; stream-phase errors are
//! never recovered. The WebSocket close code is the only error surface the
//! peer sees — reason strings are deliberately generic.

use std::io;

use thiserror::Error;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::outbound::DialError;
use crate::vless::VlessError;
use crate::ws::EarlyDataError;

/// Errors that terminate a tunnel session
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The request header could not be parsed
    #[error("malformed request header: {0}")]
    Header(#[from] VlessError),

    /// The identifier was rejected by the identity store
    #[error("authentication rejected")]
    AuthRejected,

    /// UDP command with a destination other than DNS
    #[error("unsupported UDP destination port {0} (only DNS on port 53 is relayed)")]
    UnsupportedUdp(u16),

    /// The early-data header failed to decode
    #[error("early data rejected: {0}")]
    BadEarlyData(#[from] EarlyDataError),

    /// Outbound dial failed (after the fallback, if one was configured)
    #[error("outbound dial failed: {0}")]
    DialFailed(#[from] DialError),

    /// A read or write failed mid-stream
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    /// The header, connect or idle deadline elapsed
    #[error("timed out during {stage}")]
    Timeout {
        /// Which stage the deadline belonged to
        stage: &'static str,
    },
}

impl TunnelError {
    /// Create a timeout error for the given stage
    #[must_use]
    pub const fn timeout(stage: &'static str) -> Self {
        Self::Timeout { stage }
    }

    /// The WebSocket close code surfaced to the peer
    #[must_use]
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::Header(_) | Self::UnsupportedUdp(_) | Self::BadEarlyData(_) => {
                CloseCode::Protocol
            }
            Self::AuthRejected => CloseCode::Policy,
            Self::DialFailed(_) | Self::Transport(_) | Self::Timeout { .. } => CloseCode::Error,
        }
    }

    /// The close reason surfaced to the peer.
    ///
    /// One fixed string per close code; in particular the policy-violation
    /// reason never reveals whether the identifier was known.
    #[must_use]
    pub fn close_reason(&self) -> &'static str {
        match self.close_code() {
            CloseCode::Protocol => "malformed request",
            CloseCode::Policy => "policy violation",
            _ => "tunnel error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_codes() {
        assert_eq!(
            TunnelError::Header(VlessError::TooShort(3)).close_code(),
            CloseCode::Protocol
        );
        assert_eq!(
            TunnelError::UnsupportedUdp(4433).close_code(),
            CloseCode::Protocol
        );
        assert_eq!(TunnelError::AuthRejected.close_code(), CloseCode::Policy);
        assert_eq!(
            TunnelError::timeout("idle").close_code(),
            CloseCode::Error
        );
        assert_eq!(
            TunnelError::Transport(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
                .close_code(),
            CloseCode::Error
        );
        assert_eq!(
            TunnelError::DialFailed(DialError::timeout("x:1", 10)).close_code(),
            CloseCode::Error
        );
    }

    #[test]
    fn test_close_reasons_are_generic() {
        // the reject reason must not depend on why the identifier failed
        assert_eq!(TunnelError::AuthRejected.close_reason(), "policy violation");
        assert_eq!(
            TunnelError::Header(VlessError::EmptyAddress).close_reason(),
            "malformed request"
        );
        assert_eq!(
            TunnelError::UnsupportedUdp(4433).close_reason(),
            "malformed request"
        );
        assert_eq!(TunnelError::timeout("header").close_reason(), "tunnel error");
    }

    #[test]
    fn test_display() {
        let err = TunnelError::UnsupportedUdp(4433);
        assert!(err.to_string().contains("4433"));

        let err = TunnelError::timeout("header");
        assert!(err.to_string().contains("header"));
    }
}
