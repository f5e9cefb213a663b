//! Bidirectional byte pump between the client stream and the outbound socket
//!
//! The pump drives both directions of one tunnel session inside a single
//! future: client-to-outbound ("up") and outbound-to-client ("down"), each
//! with its own transfer buffer. Byte order is preserved per direction; no
//! cross-direction ordering is imposed.
//!
//! Tunnel-specific behaviour beyond a plain bidirectional copy:
//!
//! - the two-byte response header is prepended to the first downstream
//!   chunk, exactly once per session (the flag outlives a fallback redial);
//! - `saw_downstream` latches on the first downstream byte, which is what
//!   the engine's fallback decision keys on;
//! - an optional idle deadline ends the session when neither direction
//!   makes progress;
//! - the peer closing its side shuts the outbound write down and terminates
//!   the pump, but only after downstream bytes already buffered for the
//!   client have been delivered; the outbound side closing (or failing)
//!   returns control to the engine *without* touching the client socket,
//!   so the one-shot fallback can restart the downstream flow first.
//!
//! Client-side failures are returned as errors; outbound-side failures are
//! outcomes, because the engine may still recover them via the fallback.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep, Instant, Sleep};

use super::stats::SessionStats;
use crate::vless::{response_header, RESPONSE_HEADER_LEN};

/// Transfer buffer size per direction
const BUFFER_SIZE: usize = 16 * 1024;

/// Why the pump stopped
#[derive(Debug)]
pub enum PumpEnd {
    /// The peer closed its side; the outbound write half was shut down
    PeerClosed,
    /// The outbound socket reached EOF
    OutboundClosed,
    /// The outbound socket failed on read or write
    OutboundError(io::Error),
    /// The idle deadline elapsed with no progress in either direction
    IdleTimeout,
}

/// Result of a completed pump run
#[derive(Debug)]
pub struct PumpOutcome {
    /// Why the pump stopped
    pub end: PumpEnd,
    /// Whether at least one downstream byte was forwarded
    pub saw_downstream: bool,
}

/// State for one transfer direction
struct Direction {
    buf: Box<[u8]>,
    pos: usize,
    cap: usize,
    read_done: bool,
    needs_flush: bool,
}

impl Direction {
    fn new() -> Self {
        Self {
            buf: vec![0u8; BUFFER_SIZE].into_boxed_slice(),
            pos: 0,
            cap: 0,
            read_done: false,
            needs_flush: false,
        }
    }
}

struct IdleState {
    timeout: Duration,
    sleep: Pin<Box<Sleep>>,
}

/// The per-session bidirectional pump future
pub struct TunnelPump<'a, C, O> {
    client: &'a mut C,
    outbound: &'a mut O,
    version: u8,
    responded: &'a mut bool,
    stats: &'a mut SessionStats,
    up: Direction,
    down: Direction,
    saw_downstream: bool,
    /// Set once the upstream direction terminates; the pump resolves with
    /// it after the downstream buffer has drained
    up_end: Option<PumpEnd>,
    idle: Option<IdleState>,
}

impl<'a, C, O> TunnelPump<'a, C, O>
where
    C: AsyncRead + AsyncWrite + Unpin,
    O: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a pump for one streaming attempt.
    ///
    /// `responded` must be the session-scoped response-header flag so a
    /// fallback redial cannot emit the header twice.
    pub fn new(
        client: &'a mut C,
        outbound: &'a mut O,
        version: u8,
        responded: &'a mut bool,
        stats: &'a mut SessionStats,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            client,
            outbound,
            version,
            responded,
            stats,
            up: Direction::new(),
            down: Direction::new(),
            saw_downstream: false,
            up_end: None,
            idle: idle_timeout.map(|timeout| IdleState {
                timeout,
                sleep: Box::pin(sleep(timeout)),
            }),
        }
    }

    fn outcome(&self, end: PumpEnd) -> PumpOutcome {
        PumpOutcome {
            end,
            saw_downstream: self.saw_downstream,
        }
    }

    /// Drive client-to-outbound until it parks or terminates
    fn drive_upstream(
        &mut self,
        cx: &mut Context<'_>,
        progress: &mut bool,
    ) -> Poll<io::Result<PumpEnd>> {
        loop {
            if self.up.pos < self.up.cap {
                let slice = &self.up.buf[self.up.pos..self.up.cap];
                match Pin::new(&mut *self.outbound).poll_write(cx, slice) {
                    Poll::Ready(Ok(0)) => {
                        let e = io::Error::new(io::ErrorKind::WriteZero, "write zero bytes");
                        return Poll::Ready(Ok(PumpEnd::OutboundError(e)));
                    }
                    Poll::Ready(Ok(n)) => {
                        self.up.pos += n;
                        self.stats.bytes_up += n as u64;
                        *progress = true;
                        if self.up.pos == self.up.cap {
                            self.up.pos = 0;
                            self.up.cap = 0;
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Ok(PumpEnd::OutboundError(e))),
                    Poll::Pending => return Poll::Pending,
                }
            } else if self.up.read_done {
                // Orderly closure of the outbound side, then terminate
                match Pin::new(&mut *self.outbound).poll_flush(cx) {
                    Poll::Ready(Ok(())) => {}
                    Poll::Ready(Err(e)) => return Poll::Ready(Ok(PumpEnd::OutboundError(e))),
                    Poll::Pending => return Poll::Pending,
                }
                return match Pin::new(&mut *self.outbound).poll_shutdown(cx) {
                    Poll::Ready(_) => Poll::Ready(Ok(PumpEnd::PeerClosed)),
                    Poll::Pending => Poll::Pending,
                };
            } else {
                let mut read_buf = ReadBuf::new(&mut self.up.buf);
                match Pin::new(&mut *self.client).poll_read(cx, &mut read_buf) {
                    Poll::Ready(Ok(())) => {
                        let n = read_buf.filled().len();
                        *progress = true;
                        if n == 0 {
                            self.up.read_done = true;
                        } else {
                            self.up.cap = n;
                            self.stats.packets_up += 1;
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
        }
    }

    /// Write out and flush whatever is already buffered for the client.
    ///
    /// Resolves once the buffer is empty and flushed; reads nothing new.
    fn flush_downstream_buffer(
        &mut self,
        cx: &mut Context<'_>,
        progress: &mut bool,
    ) -> Poll<io::Result<()>> {
        loop {
            if self.down.pos < self.down.cap {
                let slice = &self.down.buf[self.down.pos..self.down.cap];
                match Pin::new(&mut *self.client).poll_write(cx, slice) {
                    Poll::Ready(Ok(0)) => {
                        let e = io::Error::new(io::ErrorKind::WriteZero, "write zero bytes");
                        return Poll::Ready(Err(e));
                    }
                    Poll::Ready(Ok(n)) => {
                        self.down.pos += n;
                        *progress = true;
                        if self.down.pos == self.down.cap {
                            self.down.pos = 0;
                            self.down.cap = 0;
                            self.stats.packets_down += 1;
                            self.down.needs_flush = true;
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            } else if self.down.needs_flush {
                match Pin::new(&mut *self.client).poll_flush(cx) {
                    Poll::Ready(Ok(())) => {
                        self.down.needs_flush = false;
                        *progress = true;
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            } else {
                return Poll::Ready(Ok(()));
            }
        }
    }

    /// Drive outbound-to-client until it parks or terminates
    fn drive_downstream(
        &mut self,
        cx: &mut Context<'_>,
        progress: &mut bool,
    ) -> Poll<io::Result<PumpEnd>> {
        loop {
            match self.flush_downstream_buffer(cx, progress) {
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }

            if self.down.read_done {
                return Poll::Ready(Ok(PumpEnd::OutboundClosed));
            } else {
                // Reserve room for the response header until it has gone out
                let reserve = if *self.responded { 0 } else { RESPONSE_HEADER_LEN };
                let mut read_buf = ReadBuf::new(&mut self.down.buf[reserve..]);
                match Pin::new(&mut *self.outbound).poll_read(cx, &mut read_buf) {
                    Poll::Ready(Ok(())) => {
                        let n = read_buf.filled().len();
                        *progress = true;
                        if n == 0 {
                            self.down.read_done = true;
                        } else {
                            self.saw_downstream = true;
                            self.stats.bytes_down += n as u64;
                            if *self.responded {
                                self.down.cap = n;
                            } else {
                                let header = response_header(self.version);
                                self.down.buf[..RESPONSE_HEADER_LEN].copy_from_slice(&header);
                                self.down.cap = RESPONSE_HEADER_LEN + n;
                                *self.responded = true;
                            }
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Ok(PumpEnd::OutboundError(e))),
                    Poll::Pending => return Poll::Pending,
                }
            }
        }
    }
}

impl<C, O> Future for TunnelPump<'_, C, O>
where
    C: AsyncRead + AsyncWrite + Unpin,
    O: AsyncRead + AsyncWrite + Unpin,
{
    type Output = io::Result<PumpOutcome>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut progress = false;

        if this.up_end.is_none() {
            match this.drive_upstream(cx, &mut progress) {
                Poll::Ready(Ok(end)) => this.up_end = Some(end),
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => {}
            }
        }

        if this.up_end.is_some() {
            // Upstream is finished; downstream bytes already buffered for
            // the client still belong to the session and go out first.
            match this.flush_downstream_buffer(cx, &mut progress) {
                Poll::Ready(Ok(())) => {
                    if let Some(end) = this.up_end.take() {
                        return Poll::Ready(Ok(this.outcome(end)));
                    }
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => {}
            }
        } else if let Poll::Ready(result) = this.drive_downstream(cx, &mut progress) {
            let end = result?;
            return Poll::Ready(Ok(this.outcome(end)));
        }

        if let Some(idle) = &mut this.idle {
            if progress {
                let deadline = Instant::now() + idle.timeout;
                idle.sleep.as_mut().reset(deadline);
            }
            if idle.sleep.as_mut().poll(cx).is_ready() {
                return Poll::Ready(Ok(this.outcome(PumpEnd::IdleTimeout)));
            }
        }

        Poll::Pending
    }
}
