//! vless-gateway: a VLESS-over-WebSocket tunneling gateway
//!
//! The gateway terminates an inbound WebSocket upgrade, authenticates the
//! client by a 16-byte shared identifier, parses the VLESS request header
//! embedded in the first inbound chunk, dials the destination it names, and
//! shuttles bytes full-duplex between the WebSocket and the outbound socket
//! until either side closes. When the primary destination yields no
//! returning bytes, one optional fallback destination is tried.
//!
//! # Architecture
//!
//! ```text
//! Client ──WebSocket──► Dispatcher ──► Tunnel engine ──TCP──► Destination
//!                           │               │    ▲
//!                           │               │    └── one-shot fallback
//!                           ▼               ▼
//!                     Management API   Identity store
//!                     (HTTP, JSON)     (static + dynamic)
//! ```
//!
//! TLS termination is left to the host runtime in front of the gateway;
//! the listening socket speaks plain HTTP/1 with WebSocket upgrades.
//!
//! # Quick Start
//!
//! ```no_run
//! use vless_gateway::config::GatewayConfig;
//! use vless_gateway::gateway::GatewayServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // UUID / PROXYIP / LISTEN come from the environment
//! let config = GatewayConfig::from_env()?;
//! let server = GatewayServer::bind(config).await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`vless`]: request/response header codec
//! - [`identity`]: identifiers, identity store, dynamic key-value backend
//! - [`ws`]: WebSocket-to-byte-stream adaptation and early data
//! - [`outbound`]: outbound dialing and the fallback destination
//! - [`tunnel`]: the per-connection state machine and byte pump
//! - [`gateway`]: accept loop, dispatcher, management surface
//! - [`config`]: environment-driven configuration

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod gateway;
pub mod identity;
pub mod outbound;
pub mod tunnel;
pub mod vless;
pub mod ws;

// Re-export the types most embedders touch
pub use config::{GatewayConfig, ConfigError};
pub use gateway::{AccountRecord, GatewayError, GatewayServer, ShutdownHandle};
pub use identity::{
    AuthorizedClient, ClientId, IdentityError, IdentitySource, IdentityStore, KeyValueBackend,
    KvError, MemoryKvBackend,
};
pub use outbound::{DialError, FallbackEntry, OutboundDialer, Target, TargetHost};
pub use tunnel::{SessionStats, TunnelEngine, TunnelError};
pub use vless::{Address, Command, RequestHead, VlessError};
pub use ws::{decode_early_data, EarlyDataError, WsByteStream};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
