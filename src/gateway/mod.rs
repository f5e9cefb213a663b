//! Gateway dispatcher and HTTP surface
//!
//! A single listening socket carries both roles of the gateway: WebSocket
//! upgrades are handed to the tunnel engine, plain HTTP requests reach the
//! account-management endpoints, the share link, or the HTML UI.

pub mod dispatcher;
pub mod error;
pub mod management;
pub mod server;
pub mod ui;

pub use error::GatewayError;
pub use management::AccountRecord;
pub use server::{GatewayServer, ShutdownHandle};
