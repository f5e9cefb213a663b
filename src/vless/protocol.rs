//! VLESS wire protocol encoding and decoding
//!
//! The request header rides at the front of the first chunk a client sends
//! over the tunnel; everything after it is raw payload. There is no length
//! framing on either direction.
//!
//! # Wire Protocol
//!
//! ## Request Header
//!
//! ```text
//! +--------+-------+------+---------+---------+------+------+---------+
//! | Version|  ID   | OptL | Options | Command | Port | Atyp | Address |
//! +--------+-------+------+---------+---------+------+------+---------+
//! |   1B   |  16B  |  1B  | OptL B  |   1B    |  2B  |  1B  | Variable|
//! +--------+-------+------+---------+---------+------+------+---------+
//! ```
//!
//! The options section is opaque and skipped. Port is big-endian. Address
//! encoding by type: IPv4 is 4 bytes, Domain is a 1-byte length prefix plus
//! that many bytes, IPv6 is 16 bytes read as eight big-endian groups.
//!
//! ## Response Header
//!
//! Exactly two bytes: the request's version byte echoed verbatim, then 0x00.
//! It precedes every downstream payload byte and is sent exactly once.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::error::VlessError;

/// Minimum length of the initial chunk; anything shorter is malformed
pub const MIN_HEADER_LEN: usize = 24;

/// Length of the response header
pub const RESPONSE_HEADER_LEN: usize = 2;

/// Address type constants
pub mod address_type {
    /// IPv4 address (4 bytes)
    pub const IPV4: u8 = 0x01;
    /// Domain name (length + string)
    pub const DOMAIN: u8 = 0x02;
    /// IPv6 address (16 bytes)
    pub const IPV6: u8 = 0x03;
}

/// VLESS command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// TCP byte stream to the destination
    Tcp = 0x01,
    /// UDP packet relay (only DNS on port 53 is served)
    Udp = 0x02,
}

impl Command {
    /// Create a command from a byte value
    ///
    /// # Errors
    ///
    /// Returns `VlessError::UnsupportedCommand` for any byte other than
    /// 0x01 (TCP) or 0x02 (UDP); multiplexed transport is not supported.
    pub fn from_byte(b: u8) -> Result<Self, VlessError> {
        match b {
            0x01 => Ok(Self::Tcp),
            0x02 => Ok(Self::Udp),
            _ => Err(VlessError::UnsupportedCommand(b)),
        }
    }

    /// Convert command to byte value
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Check if this is a TCP command
    #[must_use]
    pub const fn is_tcp(self) -> bool {
        matches!(self, Self::Tcp)
    }

    /// Check if this is a UDP command
    #[must_use]
    pub const fn is_udp(self) -> bool {
        matches!(self, Self::Udp)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
        }
    }
}

/// Destination address carried in a request header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// IPv4 address
    Ipv4(Ipv4Addr),
    /// Domain name (decoded as UTF-8, never empty)
    Domain(String),
    /// IPv6 address
    Ipv6(Ipv6Addr),
}

impl Address {
    /// Create a domain address
    #[must_use]
    pub fn domain(name: impl Into<String>) -> Self {
        Self::Domain(name.into())
    }

    /// Get the address type byte
    #[must_use]
    pub const fn address_type(&self) -> u8 {
        match self {
            Self::Ipv4(_) => address_type::IPV4,
            Self::Domain(_) => address_type::DOMAIN,
            Self::Ipv6(_) => address_type::IPV6,
        }
    }

    /// Get the domain name if this is a domain address
    #[must_use]
    pub fn as_domain(&self) -> Option<&str> {
        match self {
            Self::Domain(d) => Some(d),
            _ => None,
        }
    }

    /// Get the IPv4 address if this is an IPv4 address
    #[must_use]
    pub const fn as_ipv4(&self) -> Option<Ipv4Addr> {
        match self {
            Self::Ipv4(ip) => Some(*ip),
            _ => None,
        }
    }

    /// Get the IPv6 address if this is an IPv6 address
    #[must_use]
    pub const fn as_ipv6(&self) -> Option<Ipv6Addr> {
        match self {
            Self::Ipv6(ip) => Some(*ip),
            _ => None,
        }
    }

    /// Append the wire encoding of the address (without the type byte)
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), VlessError> {
        match self {
            Self::Ipv4(ip) => buf.extend_from_slice(&ip.octets()),
            Self::Ipv6(ip) => buf.extend_from_slice(&ip.octets()),
            Self::Domain(domain) => {
                if domain.is_empty() {
                    return Err(VlessError::EmptyAddress);
                }
                if domain.len() > 255 {
                    return Err(VlessError::DomainTooLong(domain.len()));
                }
                #[allow(clippy::cast_possible_truncation)]
                buf.push(domain.len() as u8);
                buf.extend_from_slice(domain.as_bytes());
            }
        }
        Ok(())
    }
}

/// Canonical textual form: dotted-quad for IPv4, the label for domains,
/// and eight colon-separated big-endian hex groups (no zero-compression)
/// for IPv6.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4(ip) => write!(f, "{ip}"),
            Self::Domain(d) => write!(f, "{d}"),
            Self::Ipv6(ip) => {
                let groups = ip.segments();
                write!(
                    f,
                    "{:x}:{:x}:{:x}:{:x}:{:x}:{:x}:{:x}:{:x}",
                    groups[0],
                    groups[1],
                    groups[2],
                    groups[3],
                    groups[4],
                    groups[5],
                    groups[6],
                    groups[7]
                )
            }
        }
    }
}

/// Parsed VLESS request header
///
/// `payload_offset` is the byte index at which client application data
/// begins within the chunk the header was parsed from; the slice
/// `chunk[payload_offset..]` is the residual payload destined for the
/// outbound socket as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Protocol version, echoed verbatim in the response header
    pub version: u8,
    /// Client identifier (16 bytes)
    pub id: [u8; 16],
    /// Command type
    pub command: Command,
    /// Destination port
    pub port: u16,
    /// Destination address
    pub address: Address,
    /// Index of the first payload byte within the parsed chunk
    pub payload_offset: usize,
}

impl RequestHead {
    /// Parse a request header from the first inbound chunk.
    ///
    /// The parser is purely functional: it reads `buf`, allocates the
    /// result, and mutates nothing. Bytes past `payload_offset` are left
    /// for the caller to forward.
    ///
    /// # Errors
    ///
    /// Returns `VlessError` when the chunk is shorter than the header it
    /// declares, the command or address type byte is unknown, or the
    /// domain label is empty or not valid UTF-8.
    pub fn parse(buf: &[u8]) -> Result<Self, VlessError> {
        if buf.len() < MIN_HEADER_LEN {
            return Err(VlessError::TooShort(buf.len()));
        }

        let version = buf[0];
        let mut id = [0u8; 16];
        id.copy_from_slice(&buf[1..17]);

        // Options are opaque; the length byte is only a skip count.
        let options_len = buf[17] as usize;
        let command_at = 18 + options_len;

        // command (1) + port (2) + address type (1)
        if buf.len() < command_at + 4 {
            return Err(VlessError::TooShort(buf.len()));
        }
        let command = Command::from_byte(buf[command_at])?;
        let port = u16::from_be_bytes([buf[command_at + 1], buf[command_at + 2]]);
        let address_at = command_at + 4;

        let (address, address_len) = match buf[command_at + 3] {
            address_type::IPV4 => {
                if buf.len() < address_at + 4 {
                    return Err(VlessError::TooShort(buf.len()));
                }
                let mut octets = [0u8; 4];
                octets.copy_from_slice(&buf[address_at..address_at + 4]);
                (Address::Ipv4(Ipv4Addr::from(octets)), 4)
            }
            address_type::DOMAIN => {
                if buf.len() < address_at + 1 {
                    return Err(VlessError::TooShort(buf.len()));
                }
                let label_len = buf[address_at] as usize;
                if label_len == 0 {
                    return Err(VlessError::EmptyAddress);
                }
                if buf.len() < address_at + 1 + label_len {
                    return Err(VlessError::TooShort(buf.len()));
                }
                let label = std::str::from_utf8(&buf[address_at + 1..address_at + 1 + label_len])
                    .map_err(|e| VlessError::BadDomainEncoding(e.to_string()))?;
                (Address::Domain(label.to_owned()), 1 + label_len)
            }
            address_type::IPV6 => {
                if buf.len() < address_at + 16 {
                    return Err(VlessError::TooShort(buf.len()));
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[address_at..address_at + 16]);
                (Address::Ipv6(Ipv6Addr::from(octets)), 16)
            }
            other => return Err(VlessError::BadAddressType(other)),
        };

        Ok(Self {
            version,
            id,
            command,
            port,
            address,
            payload_offset: address_at + address_len,
        })
    }

    /// Encode the request header to bytes (options section empty).
    ///
    /// The counterpart of [`RequestHead::parse`]; the encoded bytes parse
    /// back to the same fields with `payload_offset` equal to the encoded
    /// length.
    ///
    /// # Errors
    ///
    /// Returns `VlessError` if the domain address is empty or too long.
    pub fn encode(&self) -> Result<Vec<u8>, VlessError> {
        let mut buf = Vec::with_capacity(MIN_HEADER_LEN + 18);
        buf.push(self.version);
        buf.extend_from_slice(&self.id);
        buf.push(0); // no options
        buf.push(self.command.as_byte());
        buf.extend_from_slice(&self.port.to_be_bytes());
        buf.push(self.address.address_type());
        self.address.encode_into(&mut buf)?;
        Ok(buf)
    }
}

/// Build the two-byte response header for the given request version
#[must_use]
pub const fn response_header(version: u8) -> [u8; RESPONSE_HEADER_LEN] {
    [version, 0x00]
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_ID: [u8; 16] = [
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
        0x10,
    ];

    fn head(command: Command, port: u16, address: Address) -> RequestHead {
        RequestHead {
            version: 0,
            id: TEST_ID,
            command,
            port,
            address,
            payload_offset: 0,
        }
    }

    #[test]
    fn test_command_from_byte() {
        assert_eq!(Command::from_byte(0x01).unwrap(), Command::Tcp);
        assert_eq!(Command::from_byte(0x02).unwrap(), Command::Udp);
        assert!(matches!(
            Command::from_byte(0x03),
            Err(VlessError::UnsupportedCommand(0x03))
        ));
        assert!(Command::from_byte(0x00).is_err());
    }

    #[test]
    fn test_command_display() {
        assert_eq!(Command::Tcp.to_string(), "TCP");
        assert_eq!(Command::Udp.to_string(), "UDP");
        assert!(Command::Tcp.is_tcp());
        assert!(Command::Udp.is_udp());
    }

    #[test]
    fn test_parse_ipv4_with_payload() {
        // version 0, id, no options, TCP, port 80, 127.0.0.1, payload "HELLO"
        let mut data = vec![0x00];
        data.extend_from_slice(&TEST_ID);
        data.extend_from_slice(&[0x00, 0x01, 0x00, 0x50, 0x01, 0x7f, 0x00, 0x00, 0x01]);
        data.extend_from_slice(b"HELLO");

        let head = RequestHead::parse(&data).unwrap();
        assert_eq!(head.version, 0);
        assert_eq!(head.id, TEST_ID);
        assert_eq!(head.command, Command::Tcp);
        assert_eq!(head.port, 80);
        assert_eq!(head.address.as_ipv4(), Some(Ipv4Addr::new(127, 0, 0, 1)));
        assert_eq!(head.payload_offset, 26);
        assert_eq!(&data[head.payload_offset..], b"HELLO");
    }

    #[test]
    fn test_parse_domain() {
        let mut data = vec![0x00];
        data.extend_from_slice(&TEST_ID);
        data.extend_from_slice(&[0x00, 0x01, 0x01, 0xbb, 0x02, 0x0b]);
        data.extend_from_slice(b"example.com");
        data.extend_from_slice(b"payload");

        let head = RequestHead::parse(&data).unwrap();
        assert_eq!(head.command, Command::Tcp);
        assert_eq!(head.port, 443);
        assert_eq!(head.address.as_domain(), Some("example.com"));
        assert_eq!(head.payload_offset, 22 + 1 + 11);
        assert_eq!(&data[head.payload_offset..], b"payload");
    }

    #[test]
    fn test_parse_ipv6() {
        let ip = Ipv6Addr::new(0x2001, 0x0db8, 0, 0, 0, 0, 0, 1);
        let mut data = vec![0x00];
        data.extend_from_slice(&TEST_ID);
        data.extend_from_slice(&[0x00, 0x01, 0x00, 0x35, 0x03]);
        data.extend_from_slice(&ip.octets());

        let head = RequestHead::parse(&data).unwrap();
        assert_eq!(head.port, 53);
        assert_eq!(head.address.as_ipv6(), Some(ip));
        assert_eq!(head.payload_offset, data.len());
    }

    #[test]
    fn test_parse_skips_options() {
        let mut data = vec![0x00];
        data.extend_from_slice(&TEST_ID);
        data.push(0x04); // four opaque option bytes
        data.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        data.extend_from_slice(&[0x01, 0x1f, 0x90, 0x01, 0x0a, 0x00, 0x00, 0x01]);

        let head = RequestHead::parse(&data).unwrap();
        assert_eq!(head.port, 8080);
        assert_eq!(head.address.as_ipv4(), Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(head.payload_offset, 22 + 4 + 4);
    }

    #[test]
    fn test_parse_too_short() {
        for len in 0..MIN_HEADER_LEN {
            let data = vec![0u8; len];
            assert!(
                matches!(RequestHead::parse(&data), Err(VlessError::TooShort(l)) if l == len),
                "length {len} must be rejected as too short"
            );
        }
    }

    #[test]
    fn test_parse_truncated_by_options() {
        // 24 bytes total but the options length pushes the command past the end
        let mut data = vec![0x00];
        data.extend_from_slice(&TEST_ID);
        data.push(0xff);
        data.extend_from_slice(&[0u8; 6]);
        assert!(matches!(
            RequestHead::parse(&data),
            Err(VlessError::TooShort(_))
        ));
    }

    #[test]
    fn test_parse_truncated_domain() {
        let mut data = vec![0x00];
        data.extend_from_slice(&TEST_ID);
        data.extend_from_slice(&[0x00, 0x01, 0x00, 0x50, 0x02, 0x20]);
        data.extend_from_slice(b"short");
        assert!(matches!(
            RequestHead::parse(&data),
            Err(VlessError::TooShort(_))
        ));
    }

    #[test]
    fn test_parse_unsupported_command() {
        let mut data = vec![0x00];
        data.extend_from_slice(&TEST_ID);
        // command 0x03 (MUX) is not supported
        data.extend_from_slice(&[0x00, 0x03, 0x00, 0x50, 0x01, 0x7f, 0x00, 0x00, 0x01]);
        assert!(matches!(
            RequestHead::parse(&data),
            Err(VlessError::UnsupportedCommand(0x03))
        ));
    }

    #[test]
    fn test_parse_bad_address_type() {
        let mut data = vec![0x00];
        data.extend_from_slice(&TEST_ID);
        data.extend_from_slice(&[0x00, 0x01, 0x00, 0x50, 0x05, 0x00, 0x00, 0x00, 0x00]);
        assert!(matches!(
            RequestHead::parse(&data),
            Err(VlessError::BadAddressType(0x05))
        ));
    }

    #[test]
    fn test_parse_empty_domain() {
        let mut data = vec![0x00];
        data.extend_from_slice(&TEST_ID);
        data.extend_from_slice(&[0x00, 0x01, 0x00, 0x50, 0x02, 0x00, 0x00]);
        assert!(matches!(
            RequestHead::parse(&data),
            Err(VlessError::EmptyAddress)
        ));
    }

    #[test]
    fn test_parse_invalid_domain_utf8() {
        let mut data = vec![0x00];
        data.extend_from_slice(&TEST_ID);
        data.extend_from_slice(&[0x00, 0x01, 0x00, 0x50, 0x02, 0x02, 0xff, 0xfe]);
        assert!(matches!(
            RequestHead::parse(&data),
            Err(VlessError::BadDomainEncoding(_))
        ));
    }

    #[test]
    fn test_parse_version_is_echoed_not_validated() {
        let mut data = vec![0x07];
        data.extend_from_slice(&TEST_ID);
        data.extend_from_slice(&[0x00, 0x01, 0x00, 0x50, 0x01, 0x7f, 0x00, 0x00, 0x01]);
        let head = RequestHead::parse(&data).unwrap();
        assert_eq!(head.version, 7);
        assert_eq!(response_header(head.version), [0x07, 0x00]);
    }

    #[test]
    fn test_encode_parse_round_trip() {
        let cases = vec![
            head(Command::Tcp, 80, Address::Ipv4(Ipv4Addr::new(127, 0, 0, 1))),
            head(Command::Tcp, 443, Address::domain("secure.example.com")),
            head(
                Command::Udp,
                53,
                Address::Ipv6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)),
            ),
            head(Command::Udp, 53, Address::Ipv4(Ipv4Addr::new(8, 8, 8, 8))),
        ];

        for case in cases {
            let mut encoded = case.encode().unwrap();
            let header_len = encoded.len();
            encoded.extend_from_slice(b"payload bytes");

            let parsed = RequestHead::parse(&encoded).unwrap();
            assert_eq!(parsed.version, case.version);
            assert_eq!(parsed.id, case.id);
            assert_eq!(parsed.command, case.command);
            assert_eq!(parsed.port, case.port);
            assert_eq!(parsed.address, case.address);
            assert_eq!(parsed.payload_offset, header_len);
            assert_eq!(&encoded[parsed.payload_offset..], b"payload bytes");
        }
    }

    #[test]
    fn test_parse_is_deterministic_on_header_slice() {
        let case = head(Command::Tcp, 8443, Address::domain("example.net"));
        let encoded = case.encode().unwrap();
        let a = RequestHead::parse(&encoded).unwrap();

        // appending payload must not change the parsed header
        let mut with_payload = encoded.clone();
        with_payload.extend_from_slice(&[0xaa; 64]);
        let b = RequestHead::parse(&with_payload).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_encode_rejects_bad_domains() {
        let empty = head(Command::Tcp, 80, Address::domain(""));
        assert!(matches!(empty.encode(), Err(VlessError::EmptyAddress)));

        let long = head(Command::Tcp, 80, Address::domain("a".repeat(256)));
        assert!(matches!(long.encode(), Err(VlessError::DomainTooLong(256))));
    }

    #[test]
    fn test_address_display() {
        assert_eq!(
            Address::Ipv4(Ipv4Addr::new(192, 168, 1, 1)).to_string(),
            "192.168.1.1"
        );
        assert_eq!(Address::domain("example.com").to_string(), "example.com");

        // IPv6 renders as eight groups without zero-compression
        let ip = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
        assert_eq!(Address::Ipv6(ip).to_string(), "2001:db8:0:0:0:0:0:1");
        assert_eq!(
            Address::Ipv6(Ipv6Addr::LOCALHOST).to_string(),
            "0:0:0:0:0:0:0:1"
        );
    }

    #[test]
    fn test_response_header() {
        assert_eq!(response_header(0), [0x00, 0x00]);
        assert_eq!(response_header(1), [0x01, 0x00]);
        assert_eq!(RESPONSE_HEADER_LEN, 2);
    }
}
