//! Gateway accept loop and HTTP plumbing
//!
//! One listening socket serves both surfaces: requests carrying
//! `Upgrade: websocket` become tunnel sessions, everything else is answered
//! by the management handlers. Each accepted connection runs in its own
//! task; a broadcast channel signals shutdown.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use super::dispatcher;
use super::error::GatewayError;
use crate::config::GatewayConfig;
use crate::identity::{IdentityStore, KeyValueBackend, MemoryKvBackend};
use crate::outbound::OutboundDialer;
use crate::tunnel::TunnelEngine;

/// Shared state handed to every connection task
pub(crate) struct GatewayState {
    pub(crate) engine: TunnelEngine,
    pub(crate) identity: Arc<IdentityStore>,
    /// Bare-hex static identifier, matched against share-link paths
    pub(crate) share_hex: String,
}

/// Handle for signalling the gateway to stop accepting connections
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    /// Signal shutdown; a no-op if the gateway already stopped
    pub fn signal(&self) {
        let _ = self.tx.send(());
    }
}

/// The VLESS-over-WebSocket gateway server
///
/// # Example
///
/// ```no_run
/// use vless_gateway::config::GatewayConfig;
/// use vless_gateway::gateway::GatewayServer;
/// use vless_gateway::identity::ClientId;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let id = ClientId::parse("550e8400-e29b-41d4-a716-446655440000")?;
/// let config = GatewayConfig::new(id).with_listen("127.0.0.1:8080".parse()?);
/// let server = GatewayServer::bind(config).await?;
/// server.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct GatewayServer {
    listener: TcpListener,
    state: Arc<GatewayState>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GatewayServer {
    /// Validate the configuration, bind the listen address, and assemble
    /// the identity store (with an in-memory dynamic backend) and tunnel
    /// engine.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` when validation or binding fails.
    pub async fn bind(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;

        let backend: Arc<dyn KeyValueBackend> = Arc::new(MemoryKvBackend::new());
        let identity = Arc::new(IdentityStore::new(config.client_id).with_dynamic(backend));

        let dialer = OutboundDialer::new(config.connect_timeout)
            .with_fallbacks(config.fallbacks.clone());
        let engine = TunnelEngine::new(identity.clone(), dialer)
            .with_header_timeout(config.header_timeout)
            .with_idle_timeout(config.idle_timeout)
            .with_dns_query_timeout(config.dns_query_timeout);

        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|e| GatewayError::bind(config.listen, e))?;

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(
            listen = %config.listen,
            client = %config.client_id,
            fallbacks = config.fallbacks.len(),
            "gateway listening"
        );

        Ok(Self {
            listener,
            state: Arc::new(GatewayState {
                engine,
                identity,
                share_hex: config.client_id.to_hex(),
            }),
            shutdown_tx,
        })
    }

    /// The bound local address (useful when listening on port 0)
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the socket is gone.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The shared identity store, for embedders that pre-seed accounts
    #[must_use]
    pub fn identity(&self) -> Arc<IdentityStore> {
        self.state.identity.clone()
    }

    /// A handle that can stop the accept loop
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Accept connections until shutdown is signalled.
    ///
    /// Accept failures are logged and retried; sessions already running are
    /// not interrupted by shutdown.
    ///
    /// # Errors
    ///
    /// Currently only returns `Ok` (on shutdown); the `Result` leaves room
    /// for fatal accept-loop conditions.
    pub async fn run(self) -> Result<(), GatewayError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        trace!(peer = %peer, "accepted connection");
                        let state = self.state.clone();
                        tokio::spawn(serve_connection(stream, peer, state));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("gateway shutdown signal received");
                    return Ok(());
                }
            }
        }
    }
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .finish()
    }
}

/// Serve one accepted TCP connection over HTTP/1 with upgrades enabled
async fn serve_connection(stream: TcpStream, peer: SocketAddr, state: Arc<GatewayState>) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
    }

    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(dispatcher::dispatch(req, peer, state).await) }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(io, service)
        .with_upgrades()
        .await
    {
        debug!(peer = %peer, error = %e, "connection ended with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ClientId;

    fn test_config() -> GatewayConfig {
        let id = ClientId::parse("01020304-0506-0708-090a-0b0c0d0e0f10").unwrap();
        GatewayConfig::new(id).with_listen("127.0.0.1:0".parse().unwrap())
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = GatewayServer::bind(test_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        assert!(addr.port() > 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let server = GatewayServer::bind(test_config()).await.unwrap();
        let shutdown = server.shutdown_handle();

        let run = tokio::spawn(server.run());
        shutdown.signal();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_address() {
        let first = GatewayServer::bind(test_config()).await.unwrap();
        let addr = first.local_addr().unwrap();

        let config = test_config().with_listen(addr);
        match GatewayServer::bind(config).await {
            Err(GatewayError::Bind { addr: reported, .. }) => assert_eq!(reported, addr),
            other => panic!("expected bind error, got {other:?}"),
        }
    }
}
