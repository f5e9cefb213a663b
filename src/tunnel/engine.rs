//! Per-connection tunnel state machine
//!
//! One session runs:
//!
//! ```text
//! Await-Header ──(valid)──► Dialing ──(dial ok)──► Streaming
//!       │                      │                      │
//!       │(invalid)             │(dial fails)          │(no bytes yet)
//!       ▼                      ▼                      ▼
//!    Rejected             Fallback-Dialing ─(ok)─► Streaming (fallback)
//!                              │                      │
//!                              │(fails)               │(any close/error)
//!                              ▼                      ▼
//!                           Aborted               Terminated
//! ```
//!
//! The first inbound chunk carries the request header; the bytes after it
//! (the residual payload) are written to the outbound socket before anything
//! else and replayed on the one fallback redial. The fallback fires when the
//! primary dial or the residual write fails, or when the downstream flow
//! ends without ever yielding a byte — and it fires at most once per
//! session.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, trace, warn};

use super::dns::serve_dns;
use super::error::TunnelError;
use super::pump::{PumpEnd, TunnelPump};
use super::stats::SessionStats;
use crate::identity::{ClientId, IdentityStore};
use crate::outbound::{OutboundDialer, Target};
use crate::vless::RequestHead;
use crate::ws::WsByteStream;

/// Default bound on receiving the first chunk
pub const DEFAULT_HEADER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default idle bound on an established session
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on one relayed DNS query
pub const DEFAULT_DNS_QUERY_TIMEOUT: Duration = Duration::from_secs(4);

/// How a finished session ended; carried into the teardown log line
#[derive(Debug)]
pub(crate) struct SessionSummary {
    pub destination: String,
    pub used_fallback: bool,
    pub closed_by: &'static str,
}

/// Drives tunnel sessions: header parsing, authentication, outbound dialing
/// with the one-shot fallback, and the bidirectional pump.
///
/// One engine is shared by every session; all per-session state lives on
/// the stack of [`TunnelEngine::serve`].
#[derive(Debug)]
pub struct TunnelEngine {
    identity: Arc<IdentityStore>,
    dialer: OutboundDialer,
    header_timeout: Duration,
    idle_timeout: Option<Duration>,
    dns_query_timeout: Duration,
}

impl TunnelEngine {
    /// Create an engine with default timeouts
    #[must_use]
    pub fn new(identity: Arc<IdentityStore>, dialer: OutboundDialer) -> Self {
        Self {
            identity,
            dialer,
            header_timeout: DEFAULT_HEADER_TIMEOUT,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            dns_query_timeout: DEFAULT_DNS_QUERY_TIMEOUT,
        }
    }

    /// Override the header deadline
    #[must_use]
    pub fn with_header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = timeout;
        self
    }

    /// Override (or disable) the idle deadline
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Override the per-query DNS relay deadline
    #[must_use]
    pub fn with_dns_query_timeout(mut self, timeout: Duration) -> Self {
        self.dns_query_timeout = timeout;
        self
    }

    /// Run one session to completion and close the socket.
    ///
    /// Errors never escape: they are logged with the session counters and
    /// surfaced to the peer only as a WebSocket close code.
    pub async fn serve<S>(&self, mut ws: WsByteStream<S>, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stats = SessionStats::new();
        match self.run(&mut ws, peer, &mut stats).await {
            Ok(summary) => {
                info!(
                    peer = %peer,
                    destination = %summary.destination,
                    fallback = summary.used_fallback,
                    closed_by = summary.closed_by,
                    bytes_up = stats.bytes_up,
                    bytes_down = stats.bytes_down,
                    packets_up = stats.packets_up,
                    packets_down = stats.packets_down,
                    duration_ms = stats.elapsed().as_millis() as u64,
                    "session finished"
                );
                ws.close_with(CloseCode::Normal, "session finished").await;
            }
            Err(e) => {
                warn!(
                    peer = %peer,
                    error = %e,
                    bytes_up = stats.bytes_up,
                    bytes_down = stats.bytes_down,
                    duration_ms = stats.elapsed().as_millis() as u64,
                    "session failed"
                );
                ws.close_with(e.close_code(), e.close_reason()).await;
            }
        }
    }

    async fn run<S>(
        &self,
        ws: &mut WsByteStream<S>,
        peer: SocketAddr,
        stats: &mut SessionStats,
    ) -> Result<SessionSummary, TunnelError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // Await-Header
        let mut first = BytesMut::with_capacity(8192);
        let n = timeout(self.header_timeout, ws.read_buf(&mut first))
            .await
            .map_err(|_| TunnelError::timeout("header"))?
            .map_err(TunnelError::Transport)?;
        if n == 0 {
            return Err(TunnelError::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed before sending a request header",
            )));
        }

        let head = RequestHead::parse(&first)?;
        trace!(
            peer = %peer,
            command = %head.command,
            destination = %head.address,
            port = head.port,
            payload = first.len() - head.payload_offset,
            "parsed request header"
        );

        let Some(auth) = self.identity.authorize(ClientId::from(head.id)).await else {
            return Err(TunnelError::AuthRejected);
        };
        debug!(
            peer = %peer,
            client = %auth.id,
            source = ?auth.source,
            destination = %head.address,
            port = head.port,
            command = %head.command,
            "session authorized"
        );

        let residual = first.split_off(head.payload_offset).freeze();

        if head.command.is_udp() {
            if head.port != 53 {
                return Err(TunnelError::UnsupportedUdp(head.port));
            }
            ws.unread(&residual);
            return serve_dns(ws, &head, stats, self.dns_query_timeout).await;
        }

        // Dialing / Streaming with the one-shot fallback
        let destination = Target::new(&head.address, head.port);
        let destination_label = destination.to_string();
        let mut target = destination;
        let mut responded = false;
        let mut used_fallback = false;

        let closed_by = loop {
            let mut outbound = match self.dialer.dial(&target).await {
                Ok(stream) => stream,
                Err(e) => match self.take_fallback(&mut used_fallback, head.port) {
                    Some(fallback) => {
                        debug!(
                            peer = %peer,
                            target = %target,
                            error = %e,
                            fallback = %fallback,
                            "dial failed, trying fallback"
                        );
                        target = fallback;
                        continue;
                    }
                    None => return Err(TunnelError::DialFailed(e)),
                },
            };

            if !residual.is_empty() {
                if let Err(e) = outbound.write_all(&residual).await {
                    match self.take_fallback(&mut used_fallback, head.port) {
                        Some(fallback) => {
                            debug!(
                                peer = %peer,
                                target = %target,
                                error = %e,
                                fallback = %fallback,
                                "residual payload write failed, trying fallback"
                            );
                            target = fallback;
                            continue;
                        }
                        None => return Err(TunnelError::Transport(e)),
                    }
                }
                stats.bytes_up += residual.len() as u64;
                stats.packets_up += 1;
            }

            let outcome = TunnelPump::new(
                ws,
                &mut outbound,
                head.version,
                &mut responded,
                stats,
                self.idle_timeout,
            )
            .await
            .map_err(TunnelError::Transport)?;

            match outcome.end {
                PumpEnd::IdleTimeout => return Err(TunnelError::timeout("idle")),
                PumpEnd::PeerClosed => break "peer",
                PumpEnd::OutboundClosed => {
                    if !outcome.saw_downstream {
                        if let Some(fallback) = self.take_fallback(&mut used_fallback, head.port)
                        {
                            debug!(
                                peer = %peer,
                                target = %target,
                                fallback = %fallback,
                                "outbound yielded no bytes, retrying via fallback"
                            );
                            target = fallback;
                            continue;
                        }
                    }
                    break "outbound";
                }
                PumpEnd::OutboundError(e) => {
                    if !outcome.saw_downstream {
                        if let Some(fallback) = self.take_fallback(&mut used_fallback, head.port)
                        {
                            debug!(
                                peer = %peer,
                                target = %target,
                                error = %e,
                                fallback = %fallback,
                                "outbound failed before any bytes, retrying via fallback"
                            );
                            target = fallback;
                            continue;
                        }
                    }
                    return Err(TunnelError::Transport(e));
                }
            }
        };

        Ok(SessionSummary {
            destination: destination_label,
            used_fallback,
            closed_by,
        })
    }

    /// Hand out the fallback destination at most once per session
    fn take_fallback(&self, used: &mut bool, original_port: u16) -> Option<Target> {
        if *used {
            return None;
        }
        let target = self.dialer.fallback_target(original_port)?;
        *used = true;
        Some(target)
    }
}
