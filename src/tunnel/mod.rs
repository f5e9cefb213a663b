//! The per-connection tunnel engine
//!
//! This is the heart of the gateway: the state machine that takes an
//! accepted WebSocket from Await-Header through Dialing (with the one-shot
//! fallback) into Streaming, plus the bidirectional pump that moves bytes
//! and enforces the response-header and ordering guarantees. Sessions own
//! their sockets and counters exclusively; the only shared state they touch
//! is the identity store.

mod dns;
pub mod engine;
pub mod error;
pub mod pump;
pub mod stats;

pub use engine::{
    TunnelEngine, DEFAULT_DNS_QUERY_TIMEOUT, DEFAULT_HEADER_TIMEOUT, DEFAULT_IDLE_TIMEOUT,
};
pub use error::TunnelError;
pub use pump::{PumpEnd, PumpOutcome, TunnelPump};
pub use stats::SessionStats;
