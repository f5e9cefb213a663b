//! Ordered byte-stream view of a WebSocket endpoint
//!
//! [`WsByteStream`] adapts a server-side WebSocket into `AsyncRead` +
//! `AsyncWrite` so the tunnel can treat it as a raw byte duplex:
//!
//! - **Read**: binary frames are surfaced in order; a frame larger than the
//!   caller's buffer carries over, so no data is ever dropped. A peer close
//!   is a clean EOF; a transport failure errors the read. Text frames error
//!   the stream (the tunnel is binary-only).
//! - **Write**: each write becomes one binary frame; the frame is pushed
//!   toward the socket before the call reports completion.
//! - **Early data**: bytes decoded from the upgrade request are seeded in
//!   front of the first frame, so the session can begin without waiting for
//!   a message.
//!
//! Backpressure is inherent to the pull model: frames are only taken from
//! the socket when the consumer reads, letting the transport exert flow
//! control on the peer.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, BytesMut};
use futures::sink::Sink;
use futures::stream::Stream;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

/// Convert a tungstenite error into the `io::Error` the stream traits need
fn to_io(e: WsError) -> io::Error {
    match e {
        WsError::Io(io_err) => io_err,
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            io::Error::new(io::ErrorKind::BrokenPipe, "websocket already closed")
        }
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}

/// A WebSocket endpoint presented as an ordered byte stream
pub struct WsByteStream<S> {
    inner: WebSocketStream<S>,
    read_buf: BytesMut,
    read_done: bool,
}

impl<S> WsByteStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a WebSocket with no early data
    #[must_use]
    pub fn new(inner: WebSocketStream<S>) -> Self {
        Self {
            inner,
            read_buf: BytesMut::with_capacity(8192),
            read_done: false,
        }
    }

    /// Wrap a WebSocket, seeding decoded early data as the first chunk
    #[must_use]
    pub fn with_early_data(inner: WebSocketStream<S>, early_data: Option<Vec<u8>>) -> Self {
        let mut stream = Self::new(inner);
        if let Some(data) = early_data {
            stream.read_buf.extend_from_slice(&data);
        }
        stream
    }

    /// Push bytes back to the front of the inbound stream.
    ///
    /// The next read observes `data` before anything else. Used to replay
    /// residual payload that a parser consumed past.
    pub fn unread(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if self.read_buf.is_empty() {
            self.read_buf.extend_from_slice(data);
        } else {
            let mut merged = BytesMut::with_capacity(data.len() + self.read_buf.len());
            merged.extend_from_slice(data);
            merged.extend_from_slice(&self.read_buf);
            self.read_buf = merged;
        }
    }

    /// Close the socket with an explicit status code.
    ///
    /// Safe to call in any state: a socket that is already closing or
    /// closed is left alone.
    pub async fn close_with(&mut self, code: CloseCode, reason: &'static str) {
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        match self.inner.close(Some(frame)).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {}
            Err(e) => debug!(error = %e, "websocket close failed"),
        }
    }
}

impl<S> AsyncRead for WsByteStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        // Drain buffered bytes (early data, unread, or frame carry-over)
        if !this.read_buf.is_empty() {
            let n = std::cmp::min(this.read_buf.len(), buf.remaining());
            buf.put_slice(&this.read_buf[..n]);
            this.read_buf.advance(n);
            return Poll::Ready(Ok(()));
        }

        if this.read_done {
            return Poll::Ready(Ok(()));
        }

        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(message))) => match message {
                    Message::Binary(data) => {
                        if data.is_empty() {
                            continue;
                        }
                        let n = std::cmp::min(data.len(), buf.remaining());
                        buf.put_slice(&data[..n]);
                        if n < data.len() {
                            this.read_buf.extend_from_slice(&data[n..]);
                        }
                        return Poll::Ready(Ok(()));
                    }
                    Message::Text(_) => {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "text frame on a binary tunnel",
                        )));
                    }
                    // Pong replies are queued by the protocol layer
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                    Message::Close(_) => {
                        this.read_done = true;
                        return Poll::Ready(Ok(()));
                    }
                },
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(to_io(e))),
                Poll::Ready(None) => {
                    this.read_done = true;
                    return Poll::Ready(Ok(()));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<S> AsyncWrite for WsByteStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        match Pin::new(&mut this.inner).poll_ready(cx) {
            Poll::Ready(Ok(())) => {}
            Poll::Ready(Err(e)) => return Poll::Ready(Err(to_io(e))),
            Poll::Pending => return Poll::Pending,
        }

        if let Err(e) = Pin::new(&mut this.inner).start_send(Message::Binary(buf.to_vec())) {
            return Poll::Ready(Err(to_io(e)));
        }

        // Push the frame toward the socket; a pending flush completes on
        // the next poll through the sink.
        if let Poll::Ready(Err(e)) = Pin::new(&mut this.inner).poll_flush(cx) {
            return Poll::Ready(Err(to_io(e)));
        }

        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_flush(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(())),
            Poll::Ready(Err(e)) => Poll::Ready(Err(to_io(e))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_close(cx) {
            Poll::Ready(Ok(()))
            | Poll::Ready(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(to_io(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> std::fmt::Debug for WsByteStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsByteStream")
            .field("buffered", &self.read_buf.len())
            .field("read_done", &self.read_done)
            .finish()
    }
}
