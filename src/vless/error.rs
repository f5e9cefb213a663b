//! VLESS header codec error types

use std::io;

use thiserror::Error;

/// Errors produced while parsing or encoding a VLESS request header.
///
/// All parse failures describe a malformed header; the tunnel closes the
/// session with a protocol-error status when any of them occurs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VlessError {
    /// The initial chunk is too small to hold a request header
    #[error("request header too short: {0} bytes (minimum 24)")]
    TooShort(usize),

    /// Command byte is not TCP (0x01) or UDP (0x02)
    #[error("unsupported command: {0:#04x} (expected 0x01=TCP, 0x02=UDP)")]
    UnsupportedCommand(u8),

    /// Address type byte is not IPv4 (0x01), Domain (0x02) or IPv6 (0x03)
    #[error("unknown address type: {0:#04x} (expected 0x01=IPv4, 0x02=Domain, 0x03=IPv6)")]
    BadAddressType(u8),

    /// Destination address is empty
    #[error("empty destination address")]
    EmptyAddress,

    /// Domain label is not valid UTF-8
    #[error("domain name is not valid UTF-8: {0}")]
    BadDomainEncoding(String),

    /// Domain name exceeds the one-byte length prefix (encode side)
    #[error("domain name too long: {0} bytes (max 255)")]
    DomainTooLong(usize),
}

/// Convert `VlessError` to `std::io::Error` for use inside stream plumbing
impl From<VlessError> for io::Error {
    fn from(e: VlessError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e.to_string())
    }
}
