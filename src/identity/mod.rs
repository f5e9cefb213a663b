//! Client identity: identifiers, the accept/reject store, and the dynamic
//! key-value backend
//!
//! A client identifier is 16 opaque bytes serving as a shared-secret
//! authenticator. Its canonical textual form is the 8-4-4-4-12 lowercase
//! hex grouping; the dynamic backend is keyed by the bare 32-character hex
//! form without separators.
//!
//! Authorization composes two read surfaces: the static identifier from
//! process configuration (byte-equal match, checked first) and an optional
//! key-value backend consulted only on static mismatch. See
//! [`IdentityStore::authorize`].

pub mod error;
pub mod kv;
pub mod store;

pub use error::{IdentityError, KvError};
pub use kv::{KeyValueBackend, MemoryKvBackend};
pub use store::{AuthorizedClient, IdentitySource, IdentityStore};

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// A 16-byte client identifier.
///
/// Comparisons are byte-wise; the store holds raw bytes as keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId([u8; 16]);

impl ClientId {
    /// Create an identifier from raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parse an identifier from its canonical textual form.
    ///
    /// Both the hyphenated 8-4-4-4-12 grouping and the bare 32-character
    /// hex form are accepted.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidId` if the string does not describe
    /// 16 bytes of hex.
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        let trimmed = s.trim();
        Uuid::parse_str(trimmed)
            .map(|u| Self(u.into_bytes()))
            .map_err(|e| IdentityError::InvalidId(format!("{trimmed}: {e}")))
    }

    /// Raw identifier bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The 32-character lowercase hex form without separators; this is the
    /// key used by the dynamic backend
    #[must_use]
    pub fn to_hex(&self) -> String {
        Uuid::from_bytes(self.0).simple().to_string()
    }
}

impl From<[u8; 16]> for ClientId {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl FromStr for ClientId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Canonical 8-4-4-4-12 lowercase hex grouping
impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0).hyphenated())
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "01020304-0506-0708-090a-0b0c0d0e0f10";

    #[test]
    fn test_parse_canonical() {
        let id = ClientId::parse(CANONICAL).unwrap();
        assert_eq!(
            id.as_bytes(),
            &[
                0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
                0x0e, 0x0f, 0x10
            ]
        );
        assert_eq!(id.to_string(), CANONICAL);
    }

    #[test]
    fn test_parse_bare_hex() {
        let id = ClientId::parse("0102030405060708090a0b0c0d0e0f10").unwrap();
        assert_eq!(id.to_string(), CANONICAL);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let id = ClientId::parse(&format!("  {CANONICAL}\n")).unwrap();
        assert_eq!(id.to_string(), CANONICAL);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ClientId::parse("not-an-id").is_err());
        assert!(ClientId::parse("").is_err());
        assert!("xyz".parse::<ClientId>().is_err());
    }

    #[test]
    fn test_to_hex() {
        let id = ClientId::parse(CANONICAL).unwrap();
        assert_eq!(id.to_hex(), "0102030405060708090a0b0c0d0e0f10");
    }

    #[test]
    fn test_byte_wise_equality() {
        let a = ClientId::from_bytes([7u8; 16]);
        let b = ClientId::from([7u8; 16]);
        let c = ClientId::from_bytes([8u8; 16]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_debug_format() {
        let id = ClientId::parse(CANONICAL).unwrap();
        assert_eq!(format!("{id:?}"), format!("ClientId({CANONICAL})"));
    }
}
