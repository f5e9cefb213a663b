//! Per-session transfer counters

use std::time::{Duration, Instant};

/// Monotonic counters owned by one tunnel session.
///
/// "Up" is client-to-destination, "down" is destination-to-client. Packets
/// count transfer chunks (WebSocket frames downstream, received chunks
/// upstream), not IP packets. The response header bytes are not counted.
#[derive(Debug, Clone, Copy)]
pub struct SessionStats {
    /// Bytes forwarded from the client to the destination
    pub bytes_up: u64,
    /// Bytes forwarded from the destination to the client
    pub bytes_down: u64,
    /// Chunks forwarded upstream
    pub packets_up: u64,
    /// Chunks forwarded downstream
    pub packets_down: u64,
    /// When the session started
    pub started_at: Instant,
}

impl SessionStats {
    /// Create zeroed counters stamped with the current time
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes_up: 0,
            bytes_down: 0,
            packets_up: 0,
            packets_down: 0,
            started_at: Instant::now(),
        }
    }

    /// Time since the session started
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Total bytes in both directions
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.bytes_up + self.bytes_down
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}
