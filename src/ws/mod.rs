//! WebSocket transport adaptation
//!
//! Presents the inbound WebSocket as an ordered byte stream (with optional
//! early data from the upgrade request) and as a sink for outbound binary
//! frames. The tunnel engine never touches WebSocket framing directly.

pub mod early_data;
pub mod error;
pub mod stream;

pub use early_data::decode_early_data;
pub use error::EarlyDataError;
pub use stream::WsByteStream;
