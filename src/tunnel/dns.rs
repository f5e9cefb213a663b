//! DNS-over-UDP relay for sessions with command UDP on port 53
//!
//! The client frames each DNS message with a 2-byte big-endian length
//! prefix. Every framed query becomes one datagram to the requested
//! resolver; every reply goes back with the same framing, after the
//! response header. Queries are relayed sequentially; an upstream that
//! stays silent past the per-query deadline just drops that query.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace};

use super::engine::SessionSummary;
use super::error::TunnelError;
use super::stats::SessionStats;
use crate::outbound::{DialError, Target};
use crate::vless::{response_header, Address, RequestHead};
use crate::ws::WsByteStream;

/// Largest DNS message the 2-byte framing can carry
const MAX_DNS_MESSAGE: usize = 65_535;

/// Run the DNS relay loop until the client closes its side.
pub(crate) async fn serve_dns<S>(
    ws: &mut WsByteStream<S>,
    head: &RequestHead,
    stats: &mut SessionStats,
    query_timeout: Duration,
) -> Result<SessionSummary, TunnelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let destination = Target::new(&head.address, head.port).to_string();
    let resolver = resolve(&head.address, head.port).await?;

    let bind_addr = if resolver.is_ipv4() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    } else {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
    };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(TunnelError::Transport)?;
    socket
        .connect(resolver)
        .await
        .map_err(TunnelError::Transport)?;

    debug!(resolver = %resolver, "dns relay started");

    // The response header goes out as its own frame, ahead of any reply
    ws.write_all(&response_header(head.version))
        .await
        .map_err(TunnelError::Transport)?;
    ws.flush().await.map_err(TunnelError::Transport)?;

    let mut reply = vec![0u8; MAX_DNS_MESSAGE];
    loop {
        let mut len_buf = [0u8; 2];
        match ws.read_exact(&mut len_buf).await {
            Ok(_) => {}
            // client is done sending queries
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(TunnelError::Transport(e)),
        }
        let query_len = u16::from_be_bytes(len_buf) as usize;
        if query_len == 0 {
            continue;
        }

        let mut query = vec![0u8; query_len];
        ws.read_exact(&mut query)
            .await
            .map_err(TunnelError::Transport)?;
        stats.packets_up += 1;
        stats.bytes_up += (2 + query_len) as u64;

        socket.send(&query).await.map_err(TunnelError::Transport)?;

        let n = match timeout(query_timeout, socket.recv(&mut reply)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(TunnelError::Transport(e)),
            Err(_) => {
                trace!(resolver = %resolver, "dns upstream timed out, dropping query");
                continue;
            }
        };
        if n == 0 {
            continue;
        }

        let mut frame = Vec::with_capacity(2 + n);
        #[allow(clippy::cast_possible_truncation)]
        frame.extend_from_slice(&(n as u16).to_be_bytes());
        frame.extend_from_slice(&reply[..n]);
        ws.write_all(&frame).await.map_err(TunnelError::Transport)?;
        ws.flush().await.map_err(TunnelError::Transport)?;
        stats.packets_down += 1;
        stats.bytes_down += (2 + n) as u64;
    }

    Ok(SessionSummary {
        destination,
        used_fallback: false,
        closed_by: "peer",
    })
}

async fn resolve(address: &Address, port: u16) -> Result<SocketAddr, TunnelError> {
    match address {
        Address::Ipv4(ip) => Ok(SocketAddr::new(IpAddr::V4(*ip), port)),
        Address::Ipv6(ip) => Ok(SocketAddr::new(IpAddr::V6(*ip), port)),
        Address::Domain(name) => {
            let target = format!("{name}:{port}");
            lookup_host((name.as_str(), port))
                .await
                .map_err(|e| TunnelError::DialFailed(DialError::connect(target.clone(), e)))?
                .next()
                .ok_or(TunnelError::DialFailed(DialError::NoAddresses { target }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vless::Command;
    use futures::{SinkExt, StreamExt};
    use tokio::io::{duplex, DuplexStream};
    use tokio_tungstenite::tungstenite::protocol::{Message, Role};
    use tokio_tungstenite::WebSocketStream;

    async fn ws_pair() -> (WsByteStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (server_io, client_io) = duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        (WsByteStream::new(server), client)
    }

    fn frame_message(payload: &[u8]) -> Vec<u8> {
        let mut framed = Vec::with_capacity(2 + payload.len());
        framed.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        framed.extend_from_slice(payload);
        framed
    }

    #[tokio::test]
    async fn test_relay_round_trip() {
        // stand-in resolver that answers every datagram with a fixed reply
        let resolver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let resolver_addr = resolver.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                let Ok((n, from)) = resolver.recv_from(&mut buf).await else {
                    break;
                };
                assert_eq!(&buf[..n], b"QUERY");
                resolver.send_to(b"ANSWER", from).await.unwrap();
            }
        });

        let head = RequestHead {
            version: 0,
            id: [0u8; 16],
            command: Command::Udp,
            port: resolver_addr.port(),
            address: Address::Ipv4(Ipv4Addr::new(127, 0, 0, 1)),
            payload_offset: 0,
        };

        let (mut server_stream, mut client) = ws_pair().await;
        let relay = async {
            let mut stats = SessionStats::new();
            let summary = serve_dns(
                &mut server_stream,
                &head,
                &mut stats,
                Duration::from_secs(2),
            )
            .await
            .unwrap();
            (summary, stats)
        };

        let driver = async {
            client
                .send(Message::Binary(frame_message(b"QUERY")))
                .await
                .unwrap();

            // response header frame first
            let header = client.next().await.unwrap().unwrap();
            assert_eq!(header.into_data(), vec![0x00, 0x00]);

            // then the framed reply
            let reply = client.next().await.unwrap().unwrap();
            assert_eq!(reply.into_data(), frame_message(b"ANSWER"));

            client.close(None).await.unwrap();
        };

        let ((summary, stats), ()) = tokio::join!(relay, driver);
        assert_eq!(summary.closed_by, "peer");
        assert!(!summary.used_fallback);
        assert_eq!(stats.packets_up, 1);
        assert_eq!(stats.packets_down, 1);
        assert_eq!(stats.bytes_up, 7);
        assert_eq!(stats.bytes_down, 8);
    }

    #[tokio::test]
    async fn test_upstream_timeout_drops_query() {
        // resolver that never answers
        let resolver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let resolver_addr = resolver.local_addr().unwrap();

        let head = RequestHead {
            version: 0,
            id: [0u8; 16],
            command: Command::Udp,
            port: resolver_addr.port(),
            address: Address::Ipv4(Ipv4Addr::new(127, 0, 0, 1)),
            payload_offset: 0,
        };

        let (mut server_stream, mut client) = ws_pair().await;
        let relay = async {
            let mut stats = SessionStats::new();
            serve_dns(
                &mut server_stream,
                &head,
                &mut stats,
                Duration::from_millis(50),
            )
            .await
            .unwrap();
            stats
        };

        let driver = async {
            client
                .send(Message::Binary(frame_message(b"LOST")))
                .await
                .unwrap();

            // only the response header arrives; then we hang up
            let header = client.next().await.unwrap().unwrap();
            assert_eq!(header.into_data(), vec![0x00, 0x00]);
            client.close(None).await.unwrap();
        };

        let (stats, ()) = tokio::join!(relay, driver);
        assert_eq!(stats.packets_up, 1);
        assert_eq!(stats.packets_down, 0);
    }
}
