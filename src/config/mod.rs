//! Gateway configuration
//!
//! Configuration comes from the process environment:
//!
//! - `UUID` — static client identifier in canonical textual form. A
//!   built-in default exists so the gateway starts out of the box, but it
//!   is logged loudly and must be overridden for real deployments.
//! - `PROXYIP` — optional fallback destination list, comma or whitespace
//!   separated, each entry `host` or `host:port`.
//! - `LISTEN` — socket address to bind, default `0.0.0.0:8080`.
//!
//! Timeouts have sensible defaults and builder-style overrides for tests
//! and embedders.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::identity::ClientId;
use crate::outbound::{DialError, FallbackEntry};
use crate::tunnel::{DEFAULT_DNS_QUERY_TIMEOUT, DEFAULT_HEADER_TIMEOUT, DEFAULT_IDLE_TIMEOUT};

/// Built-in static identifier; override with the `UUID` environment
/// variable in any real deployment.
pub const DEFAULT_CLIENT_ID: &str = "d342d11e-d424-4583-b36e-524ab1f0afa4";

/// Default listen address
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unusable value
    #[error("invalid value for {var}: {reason}")]
    Env {
        /// The variable name
        var: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// The assembled configuration is inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn env(var: &'static str, reason: impl ToString) -> Self {
        Self::Env {
            var,
            reason: reason.to_string(),
        }
    }
}

/// Gateway process configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to listen on
    pub listen: SocketAddr,
    /// Static client identifier
    pub client_id: ClientId,
    /// Fallback destinations ("proxy IP" list); may be empty
    pub fallbacks: Vec<FallbackEntry>,
    /// Bound on receiving the first chunk of a session
    pub header_timeout: Duration,
    /// Bound on one outbound connect attempt
    pub connect_timeout: Duration,
    /// Idle bound on an established session; `None` disables it
    pub idle_timeout: Option<Duration>,
    /// Bound on one relayed DNS query
    pub dns_query_timeout: Duration,
}

impl GatewayConfig {
    /// Create a configuration with defaults for everything but the identity
    #[must_use]
    pub fn new(client_id: ClientId) -> Self {
        Self {
            // the default string is a valid socket address
            listen: DEFAULT_LISTEN.parse().unwrap_or_else(|_| {
                SocketAddr::from(([0, 0, 0, 0], 8080))
            }),
            client_id,
            fallbacks: Vec::new(),
            header_timeout: DEFAULT_HEADER_TIMEOUT,
            connect_timeout: crate::outbound::DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            dns_query_timeout: DEFAULT_DNS_QUERY_TIMEOUT,
        }
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a set variable holds an unusable value;
    /// unset variables fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_id = match env::var("UUID") {
            Ok(raw) => ClientId::parse(&raw).map_err(|e| ConfigError::env("UUID", e))?,
            Err(_) => {
                warn!(
                    "UUID is not set; using the built-in default identifier — override it \
                     before exposing this gateway"
                );
                ClientId::parse(DEFAULT_CLIENT_ID)
                    .map_err(|e| ConfigError::env("UUID", e))?
            }
        };

        let mut config = Self::new(client_id);

        if let Ok(raw) = env::var("LISTEN") {
            config.listen = raw.parse().map_err(|e| ConfigError::env("LISTEN", e))?;
        }

        if let Ok(raw) = env::var("PROXYIP") {
            config.fallbacks =
                parse_fallback_list(&raw).map_err(|e| ConfigError::env("PROXYIP", e))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Override the listen address
    #[must_use]
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// Override the fallback destination list
    #[must_use]
    pub fn with_fallbacks(mut self, fallbacks: Vec<FallbackEntry>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// Override the header deadline
    #[must_use]
    pub fn with_header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = timeout;
        self
    }

    /// Override the connect deadline
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override (or disable) the idle deadline
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Check the configuration for inconsistencies.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when a mandatory deadline is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.header_timeout.is_zero() {
            return Err(ConfigError::Invalid("header timeout must be non-zero".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "connect timeout must be non-zero".into(),
            ));
        }
        if self.dns_query_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "dns query timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a `PROXYIP`-style list: entries separated by commas or whitespace.
///
/// # Errors
///
/// Returns the underlying `DialError` for the first unusable entry.
pub fn parse_fallback_list(raw: &str) -> Result<Vec<FallbackEntry>, DialError> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(FallbackEntry::parse)
        .collect()
}
