//! Outbound connections
//!
//! Dialing is deliberately thin: one bounded TCP connect per call, socket
//! options applied, and the optional fallback destination ("proxy IP")
//! resolved here. Everything stateful — the one-shot retry, residual
//! payload replay, pump restart — belongs to the tunnel engine.

pub mod dialer;
pub mod error;

pub use dialer::{
    FallbackEntry, OutboundDialer, Target, TargetHost, DEFAULT_CONNECT_TIMEOUT,
};
pub use error::DialError;
