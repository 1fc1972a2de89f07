use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use crate::error::{Result, RtspError, StunErrorKind};

/// STUN message header size (20 bytes).
const STUN_HEADER_SIZE: usize = 20;

/// STUN magic cookie value (RFC 5389 §6).
pub const STUN_MAGIC_COOKIE: u32 = 0x2112A442;

const BINDING_REQUEST: u16 = 0x0001;
const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
const FAMILY_IPV4: u8 = 0x01;

/// Public STUN server used when none is configured.
pub const DEFAULT_STUN_SERVER: &str = "stun.l.google.com:19302";

/// Discovers the public address a NAT assigned to a bound UDP socket.
///
/// The request goes out over the caller's own socket, so the answer
/// describes that socket's mapping and nothing else. Each attempt waits up
/// to [`timeout`](Self::timeout) for a response carrying our transaction id;
/// unrelated datagrams arriving meanwhile are discarded.
#[derive(Debug, Clone)]
pub struct StunClient {
    server: String,
    timeout: Duration,
    attempts: u32,
}

impl StunClient {
    pub fn new(server: &str) -> Self {
        Self {
            server: server.to_string(),
            timeout: Duration::from_secs(2),
            attempts: 2,
        }
    }

    /// Per-attempt response timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Resolve the public `ip:port` of `socket`.
    ///
    /// The socket's read timeout is restored before returning.
    pub fn mapped_address(&self, socket: &UdpSocket) -> Result<SocketAddrV4> {
        let server = self.resolve()?;
        let previous_timeout = socket.read_timeout()?;
        let result = self.exchange(socket, server);
        socket.set_read_timeout(previous_timeout)?;

        match &result {
            Ok(mapped) => tracing::debug!(%server, %mapped, "STUN mapping obtained"),
            Err(e) => tracing::warn!(%server, error = %e, "STUN lookup failed"),
        }
        result
    }

    fn resolve(&self) -> Result<SocketAddr> {
        self.server
            .to_socket_addrs()?
            .find(SocketAddr::is_ipv4)
            .ok_or(RtspError::stun(StunErrorKind::Resolve))
    }

    fn exchange(&self, socket: &UdpSocket, server: SocketAddr) -> Result<SocketAddrV4> {
        let transaction_id = rand::random::<[u8; 12]>();
        let request = binding_request(&transaction_id);
        let mut last_error = RtspError::stun(StunErrorKind::Timeout);
        let mut buf = [0u8; 1500];

        for attempt in 1..=self.attempts {
            tracing::trace!(%server, attempt, "sending STUN binding request");
            if let Err(e) = socket.send_to(&request, server) {
                tracing::debug!(attempt, error = %e, "STUN send failed");
                last_error = e.into();
                continue;
            }
            last_error = RtspError::stun(StunErrorKind::Timeout);

            let deadline = Instant::now() + self.timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                socket.set_read_timeout(Some(remaining))?;

                let n = match socket.recv_from(&mut buf) {
                    Ok((n, _)) => n,
                    Err(e) if is_timeout(&e) => break,
                    Err(e) => return Err(e.into()),
                };

                match parse_binding_response(&buf[..n], &transaction_id) {
                    Ok(mapped) => return Ok(mapped),
                    Err(e) => tracing::trace!(error = %e, "ignoring datagram during STUN wait"),
                }
            }
        }

        Err(last_error)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Encode a 20-byte Binding Request with no attributes.
pub fn binding_request(transaction_id: &[u8; 12]) -> [u8; STUN_HEADER_SIZE] {
    let mut req = [0u8; STUN_HEADER_SIZE];
    req[0..2].copy_from_slice(&BINDING_REQUEST.to_be_bytes());
    req[4..8].copy_from_slice(&STUN_MAGIC_COOKIE.to_be_bytes());
    req[8..20].copy_from_slice(transaction_id);
    req
}

/// Decode the mapped IPv4 address from a Binding Response.
///
/// Attributes are walked in order, each value padded to a 4-byte boundary
/// (the padding is not part of the declared length). The first usable
/// XOR-MAPPED-ADDRESS or MAPPED-ADDRESS wins.
pub fn parse_binding_response(buf: &[u8], transaction_id: &[u8; 12]) -> Result<SocketAddrV4> {
    if buf.len() < STUN_HEADER_SIZE {
        return Err(RtspError::stun(StunErrorKind::ShortResponse));
    }

    let cookie = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if cookie != STUN_MAGIC_COOKIE {
        return Err(RtspError::stun(StunErrorKind::BadCookie));
    }
    if &buf[8..20] != transaction_id {
        return Err(RtspError::stun(StunErrorKind::TransactionMismatch));
    }

    let msg_len = usize::from(u16::from_be_bytes([buf[2], buf[3]]));
    let end = (STUN_HEADER_SIZE + msg_len).min(buf.len());
    let mut offset = STUN_HEADER_SIZE;
    let mut error = RtspError::stun(StunErrorKind::NoMappedAddress);

    while offset + 4 <= end {
        let attr_type = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
        let attr_len = usize::from(u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]));
        let value_start = offset + 4;
        let Some(value) = buf.get(value_start..value_start + attr_len) else {
            break;
        };

        let decoded = match attr_type {
            ATTR_XOR_MAPPED_ADDRESS => Some(decode_address(value, true)),
            ATTR_MAPPED_ADDRESS => Some(decode_address(value, false)),
            _ => None,
        };
        match decoded {
            Some(Ok(addr)) => return Ok(addr),
            Some(Err(e)) => error = e,
            None => {}
        }

        offset = value_start + attr_len.next_multiple_of(4);
    }

    Err(error)
}

/// Decode an address attribute value: reserved, family, port, IPv4.
fn decode_address(value: &[u8], xor: bool) -> Result<SocketAddrV4> {
    if value.len() < 8 {
        return Err(RtspError::stun(StunErrorKind::NoMappedAddress));
    }
    if value[1] != FAMILY_IPV4 {
        return Err(RtspError::stun(StunErrorKind::UnsupportedFamily));
    }

    let mut port = u16::from_be_bytes([value[2], value[3]]);
    let mut ip = u32::from_be_bytes([value[4], value[5], value[6], value[7]]);
    if xor {
        port ^= (STUN_MAGIC_COOKIE >> 16) as u16;
        ip ^= STUN_MAGIC_COOKIE;
    }

    Ok(SocketAddrV4::new(Ipv4Addr::from(ip), port))
}
