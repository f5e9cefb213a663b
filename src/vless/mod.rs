//! VLESS request/response header codec
//!
//! VLESS is a stateless tunneling request format: a version byte, a 16-byte
//! client identifier, an opaque options section, a command, and a destination
//! address. Payload follows the header raw; the server answers with a
//! two-byte response header and the tunnel becomes a plain byte duplex.
//!
//! The parser here works on the first inbound chunk as a byte slice and
//! reports where the residual payload begins; see [`RequestHead::parse`].
//!
//! # Example
//!
//! ```
//! use vless_gateway::vless::{Address, Command, RequestHead};
//!
//! let head = RequestHead {
//!     version: 0,
//!     id: [0u8; 16],
//!     command: Command::Tcp,
//!     port: 443,
//!     address: Address::domain("example.com"),
//!     payload_offset: 0,
//! };
//! let wire = head.encode().unwrap();
//! let parsed = RequestHead::parse(&wire).unwrap();
//! assert_eq!(parsed.address.as_domain(), Some("example.com"));
//! assert_eq!(parsed.payload_offset, wire.len());
//! ```

pub mod error;
pub mod protocol;

pub use error::VlessError;
pub use protocol::{
    address_type, response_header, Address, Command, RequestHead, MIN_HEADER_LEN,
    RESPONSE_HEADER_LEN,
};
