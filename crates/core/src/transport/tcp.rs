use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::request::find_blank_line;

/// Largest RTSP response the session engine accepts.
pub const SESSION_MESSAGE_LIMIT: usize = 8192;

/// Largest RTSP message the proxy relays in either direction.
pub const PROXY_MESSAGE_LIMIT: usize = 4096;

/// Largest HTTP request head the gateway accepts.
pub const HTTP_REQUEST_LIMIT: usize = 4096;

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly.
/// Every accepted connection gets its own thread running `handle`.
pub fn accept_loop<F>(listener: TcpListener, running: Arc<AtomicBool>, handle: F)
where
    F: Fn(TcpStream, SocketAddr) + Clone + Send + 'static,
{
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let handle = handle.clone();
                let spawned = thread::Builder::new()
                    .name(format!("conn-{peer_addr}"))
                    .spawn(move || handle(stream, peer_addr));
                if let Err(e) = spawned {
                    tracing::error!(%peer_addr, error = %e, "failed to spawn connection thread");
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// Reads whole RTSP/HTTP messages off a byte stream.
///
/// A message is its head up to the blank line plus `Content-Length` body
/// bytes. Bytes that arrive past the end of one message are kept for the
/// next call, so pipelined or coalesced messages are split correctly.
/// Blank lines between messages are skipped.
pub struct MessageReader<R> {
    inner: R,
    buf: Vec<u8>,
    limit: usize,
}

impl<R: Read> MessageReader<R> {
    pub fn new(inner: R, limit: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(limit.min(SESSION_MESSAGE_LIMIT)),
            limit,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Read the next complete message.
    ///
    /// Returns `Ok(None)` when the peer closes cleanly between messages.
    pub fn read_message(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = [0u8; 2048];
        loop {
            let leading = self
                .buf
                .iter()
                .take_while(|b| **b == b'\r' || **b == b'\n')
                .count();
            self.buf.drain(..leading);

            if let Some(head_end) = find_blank_line(&self.buf) {
                let total = match head_end.checked_add(content_length(&self.buf[..head_end])) {
                    Some(total) if total <= self.limit => total,
                    _ => return Err(RtspError::parse(ParseErrorKind::TooLarge)),
                };
                if self.buf.len() >= total {
                    return Ok(Some(self.buf.drain(..total).collect()));
                }
            } else if self.buf.len() >= self.limit {
                return Err(RtspError::parse(ParseErrorKind::TooLarge));
            }

            let n = self.inner.read(&mut chunk)?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(RtspError::parse(ParseErrorKind::Truncated));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Scan a message head for `Content-Length` (case-insensitive).
fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}
