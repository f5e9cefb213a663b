//! WebSocket adaptation error types

use thiserror::Error;

/// Failure to decode the early-data subprotocol header.
///
/// Treated like a malformed request header: the session is closed with a
/// protocol-error status.
#[derive(Debug, Error)]
pub enum EarlyDataError {
    /// The header value is not valid base64url
    #[error("early data is not valid base64url: {0}")]
    Decode(#[from] base64::DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    #[test]
    fn test_error_display() {
        let err = URL_SAFE_NO_PAD.decode("!!!").unwrap_err();
        let err = EarlyDataError::from(err);
        assert!(err.to_string().contains("base64url"));
    }
}
