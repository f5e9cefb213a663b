//! Outbound TCP dialing with an optional fallback destination
//!
//! The dialer opens one TCP connection per call with a bounded timeout and
//! performs no retries of its own; retry policy (the one-shot fallback)
//! lives in the tunnel engine. IP literals are dialed directly, domain
//! names go through the runtime resolver.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use rand::Rng;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::error::DialError;
use crate::vless::Address;

/// Default bound on a single connect attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Destination host of an outbound connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetHost {
    /// Numeric IPv4/IPv6 literal, dialed without resolution
    Ip(IpAddr),
    /// Domain name, resolved by the runtime
    Name(String),
}

/// A dialable destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Destination host
    pub host: TargetHost,
    /// Destination port
    pub port: u16,
}

impl Target {
    /// Build a target from a parsed request destination
    #[must_use]
    pub fn new(address: &Address, port: u16) -> Self {
        let host = match address {
            Address::Ipv4(ip) => TargetHost::Ip(IpAddr::V4(*ip)),
            Address::Ipv6(ip) => TargetHost::Ip(IpAddr::V6(*ip)),
            Address::Domain(name) => TargetHost::Name(name.clone()),
        };
        Self { host, port }
    }

    /// Build a target from a host string, parsing IP literals
    #[must_use]
    pub fn from_host(host: &str, port: u16) -> Self {
        let host = host
            .parse::<IpAddr>()
            .map_or_else(|_| TargetHost::Name(host.to_owned()), TargetHost::Ip);
        Self { host, port }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            TargetHost::Ip(IpAddr::V6(ip)) => write!(f, "[{ip}]:{}", self.port),
            TargetHost::Ip(IpAddr::V4(ip)) => write!(f, "{ip}:{}", self.port),
            TargetHost::Name(name) => write!(f, "{name}:{}", self.port),
        }
    }
}

/// One entry of the fallback destination list.
///
/// An entry is `host` or `host:port`; IPv6 literals with a port use the
/// bracketed form. Without an explicit port the original destination port
/// is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackEntry {
    host: String,
    port: Option<u16>,
}

impl FallbackEntry {
    /// Parse a single fallback entry.
    ///
    /// # Errors
    ///
    /// Returns `DialError::InvalidFallback` when the entry is empty, the
    /// bracketed form is unterminated, or the port is not a number.
    pub fn parse(s: &str) -> Result<Self, DialError> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(DialError::InvalidFallback(s.to_owned()));
        }

        // [v6] or [v6]:port
        if let Some(rest) = raw.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| DialError::InvalidFallback(raw.to_owned()))?;
            if host.is_empty() {
                return Err(DialError::InvalidFallback(raw.to_owned()));
            }
            let port = match tail {
                "" => None,
                _ => Some(
                    tail.strip_prefix(':')
                        .and_then(|p| p.parse().ok())
                        .ok_or_else(|| DialError::InvalidFallback(raw.to_owned()))?,
                ),
            };
            return Ok(Self {
                host: host.to_owned(),
                port,
            });
        }

        if let Some((host, port)) = raw.rsplit_once(':') {
            // more than one colon means a bare IPv6 literal, not host:port
            if !host.contains(':') {
                if host.is_empty() {
                    return Err(DialError::InvalidFallback(raw.to_owned()));
                }
                let port = port
                    .parse()
                    .map_err(|_| DialError::InvalidFallback(raw.to_owned()))?;
                return Ok(Self {
                    host: host.to_owned(),
                    port: Some(port),
                });
            }
        }

        Ok(Self {
            host: raw.to_owned(),
            port: None,
        })
    }

    /// The entry's host
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The entry's explicit port, if one was given
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Resolve the entry to a target for the given original port
    #[must_use]
    pub fn to_target(&self, original_port: u16) -> Target {
        Target::from_host(&self.host, self.port.unwrap_or(original_port))
    }
}

/// Opens outbound TCP connections and hands out the fallback destination
#[derive(Debug, Clone)]
pub struct OutboundDialer {
    connect_timeout: Duration,
    fallbacks: Vec<FallbackEntry>,
}

impl Default for OutboundDialer {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl OutboundDialer {
    /// Create a dialer with the given per-attempt connect timeout
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            fallbacks: Vec::new(),
        }
    }

    /// Attach the fallback destination list
    #[must_use]
    pub fn with_fallbacks(mut self, fallbacks: Vec<FallbackEntry>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// Whether any fallback destination is configured
    #[must_use]
    pub fn has_fallback(&self) -> bool {
        !self.fallbacks.is_empty()
    }

    /// Pick a fallback destination for the given original port.
    ///
    /// When several are configured one is chosen uniformly at random per
    /// attempt. Returns `None` when the list is empty.
    #[must_use]
    pub fn fallback_target(&self, original_port: u16) -> Option<Target> {
        if self.fallbacks.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..self.fallbacks.len());
        Some(self.fallbacks[index].to_target(original_port))
    }

    /// Open a TCP connection to the target.
    ///
    /// # Errors
    ///
    /// Returns `DialError` when the attempt times out, the connect fails,
    /// or a domain name resolves to nothing.
    pub async fn dial(&self, target: &Target) -> Result<TcpStream, DialError> {
        let stream = timeout(self.connect_timeout, Self::connect(target))
            .await
            .map_err(|_| {
                DialError::timeout(target.to_string(), self.connect_timeout.as_millis() as u64)
            })?
            .map_err(|e| DialError::connect(target.to_string(), e))?;

        Self::configure_socket(&stream);
        debug!(target = %target, "outbound connection established");
        Ok(stream)
    }

    async fn connect(target: &Target) -> std::io::Result<TcpStream> {
        match &target.host {
            TargetHost::Ip(ip) => TcpStream::connect(SocketAddr::new(*ip, target.port)).await,
            TargetHost::Name(name) => TcpStream::connect((name.as_str(), target.port)).await,
        }
    }

    /// Set transfer-friendly socket options; failures are non-fatal
    fn configure_socket(stream: &TcpStream) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "failed to set TCP_NODELAY");
        }

        let socket_ref = SockRef::from(stream);
        let keepalive = TcpKeepalive::new()
            .with_time(Duration::from_secs(60))
            .with_interval(Duration::from_secs(20));

        #[cfg(target_os = "linux")]
        let keepalive = keepalive.with_retries(3);

        if let Err(e) = socket_ref.set_tcp_keepalive(&keepalive) {
            debug!(error = %e, "failed to set TCP keepalive");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_target_from_address() {
        let t = Target::new(&Address::Ipv4(Ipv4Addr::new(127, 0, 0, 1)), 80);
        assert_eq!(t.host, TargetHost::Ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
        assert_eq!(t.to_string(), "127.0.0.1:80");

        let t = Target::new(&Address::domain("example.com"), 443);
        assert_eq!(t.host, TargetHost::Name("example.com".into()));
        assert_eq!(t.to_string(), "example.com:443");

        let ip = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
        let t = Target::new(&Address::Ipv6(ip), 8080);
        assert_eq!(t.to_string(), "[2001:db8::1]:8080");
    }

    #[test]
    fn test_target_from_host_parses_literals() {
        let t = Target::from_host("10.1.2.3", 443);
        assert!(matches!(t.host, TargetHost::Ip(IpAddr::V4(_))));

        let t = Target::from_host("2001:db8::1", 443);
        assert!(matches!(t.host, TargetHost::Ip(IpAddr::V6(_))));

        let t = Target::from_host("cdn.example", 443);
        assert!(matches!(t.host, TargetHost::Name(_)));
    }

    #[test]
    fn test_fallback_entry_host_only() {
        let entry = FallbackEntry::parse("cdn.example").unwrap();
        assert_eq!(entry.host(), "cdn.example");
        assert_eq!(entry.port(), None);
        assert_eq!(entry.to_target(443).to_string(), "cdn.example:443");
    }

    #[test]
    fn test_fallback_entry_host_and_port() {
        let entry = FallbackEntry::parse("cdn.example:8443").unwrap();
        assert_eq!(entry.port(), Some(8443));
        // explicit port wins over the original destination port
        assert_eq!(entry.to_target(443).to_string(), "cdn.example:8443");
    }

    #[test]
    fn test_fallback_entry_ipv6() {
        let entry = FallbackEntry::parse("2001:db8::1").unwrap();
        assert_eq!(entry.host(), "2001:db8::1");
        assert_eq!(entry.port(), None);

        let entry = FallbackEntry::parse("[2001:db8::1]:443").unwrap();
        assert_eq!(entry.host(), "2001:db8::1");
        assert_eq!(entry.port(), Some(443));

        let entry = FallbackEntry::parse("[2001:db8::1]").unwrap();
        assert_eq!(entry.port(), None);
    }

    #[test]
    fn test_fallback_entry_invalid() {
        assert!(FallbackEntry::parse("").is_err());
        assert!(FallbackEntry::parse("   ").is_err());
        assert!(FallbackEntry::parse("[2001:db8::1").is_err());
        assert!(FallbackEntry::parse("host:notaport").is_err());
        assert!(FallbackEntry::parse(":443").is_err());
    }

    #[test]
    fn test_fallback_target_selection() {
        let dialer = OutboundDialer::default();
        assert!(!dialer.has_fallback());
        assert!(dialer.fallback_target(443).is_none());

        let dialer = OutboundDialer::default()
            .with_fallbacks(vec![FallbackEntry::parse("cdn.example").unwrap()]);
        assert!(dialer.has_fallback());
        assert_eq!(
            dialer.fallback_target(443).unwrap().to_string(),
            "cdn.example:443"
        );
    }

    #[test]
    fn test_fallback_random_pick_stays_in_list() {
        let entries = vec![
            FallbackEntry::parse("a.example").unwrap(),
            FallbackEntry::parse("b.example").unwrap(),
            FallbackEntry::parse("c.example:99").unwrap(),
        ];
        let dialer = OutboundDialer::default().with_fallbacks(entries);

        for _ in 0..64 {
            let target = dialer.fallback_target(443).unwrap();
            let s = target.to_string();
            assert!(
                s == "a.example:443" || s == "b.example:443" || s == "c.example:99",
                "unexpected pick {s}"
            );
        }
    }

    #[tokio::test]
    async fn test_dial_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1];
            let _ = socket.read(&mut buf).await;
        });

        let dialer = OutboundDialer::default();
        let target = Target::from_host(&addr.ip().to_string(), addr.port());
        let stream = dialer.dial(&target).await.unwrap();
        drop(stream);
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // bind-then-drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dialer = OutboundDialer::new(Duration::from_millis(500));
        let target = Target::from_host("127.0.0.1", addr.port());
        match dialer.dial(&target).await {
            Err(DialError::Connect { .. } | DialError::Timeout { .. }) => {}
            other => panic!("expected connect failure, got {other:?}"),
        }
    }
}
