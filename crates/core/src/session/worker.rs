//! The three threads of a playing gateway session.
//!
//! ```text
//!  upstream ──UDP──> receive_loop ──Producer──> ring ──Consumer──> send_loop ──HTTP──> client
//!
//!  upstream <──RTSP GET_PARAMETER / RTCP RR── keepalive_loop
//! ```
//!
//! All three share one [`StopSignal`]. Whichever side fails first raises it
//! and the others exit within one poll interval.

use std::io::{self, Write};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cancel::StopSignal;
use crate::media::rtcp;
use crate::media::{Consumer, Datagram, Producer, PushError};
use crate::protocol::RtspRequest;
use crate::session::client::RtspClient;
use crate::transport::udp;

/// Read timeout on the RTP socket so the receive loop notices `stop`.
pub const RECEIVE_POLL: Duration = Duration::from_millis(500);

/// Response head written to the HTTP client before the first payload.
pub const HTTP_OK_HEADER: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: video/mp2t\r\nConnection: close\r\n\r\n";

/// Where the receive thread should fire its firewall-opening packet.
#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    pub peer: SocketAddr,
    pub ssrc: u32,
}

/// Pull datagrams off `socket` and push RTP payloads into the ring.
///
/// Non-RTP datagrams and malformed RTP are logged and dropped. A socket error other than the poll timeout stops the session.
pub fn receive_loop(
    socket: UdpSocket,
    mut producer: Producer,
    stop: StopSignal,
    trigger: Option<Trigger>,
    max_packet_size: usize,
) {
    if let Err(e) = socket.set_read_timeout(Some(RECEIVE_POLL)) {
        tracing::error!(error = %e, "failed to set RTP read timeout");
        stop.stop();
        return;
    }

    if let Some(trigger) = trigger {
        match udp::send_trigger(&socket, trigger.peer, trigger.ssrc) {
            Ok(()) => tracing::debug!(peer = %trigger.peer, "sent RTP trigger"),
            Err(e) => tracing::warn!(peer = %trigger.peer, error = %e, "RTP trigger failed"),
        }
    }

    let mut buf = vec![0u8; max_packet_size];
    let mut received: u64 = 0;

    while !stop.is_stopped() {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _)) => len,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "RTP socket failed");
                stop.stop();
                break;
            }
        };

        let payload = match Datagram::decode(&buf[..len]) {
            Ok(Datagram::Rtp { payload, .. }) => payload,
            Ok(Datagram::Opaque(_)) => {
                tracing::warn!(len, "dropping non-RTP datagram");
                continue;
            }
            Err(e) => {
                tracing::warn!(len, error = %e, "dropping malformed RTP packet");
                continue;
            }
        };

        match producer.push(payload, &stop) {
            Ok(true) => received += 1,
            Ok(false) => break,
            Err(PushError::Oversized) => {
                tracing::warn!(len = payload.len(), "payload larger than ring slot");
            }
            Err(e) => tracing::warn!(error = ?e, "dropping RTP payload"),
        }
    }

    tracing::debug!(received, "receive loop finished");
}

/// Write the HTTP response head, then every payload from the ring in order.
///
/// The head goes out before the first payload so a session that never
/// reaches PLAY just closes the connection. A write failure (client gone)
/// stops the session.
pub fn send_loop<W: Write>(mut out: W, mut consumer: Consumer, stop: StopSignal) {
    if let Err(e) = out.write_all(HTTP_OK_HEADER).and_then(|()| out.flush()) {
        tracing::debug!(error = %e, "HTTP client gone before stream start");
        stop.stop();
        return;
    }

    let mut sent: u64 = 0;
    while let Some(result) = consumer.pop_with(&stop, |payload| out.write_all(payload)) {
        if let Err(e) = result {
            tracing::debug!(error = %e, "HTTP client write failed");
            stop.stop();
            break;
        }
        sent += 1;
    }

    tracing::debug!(sent, "send loop finished");
}

/// Upstream RTCP destination for the periodic receiver report.
pub struct ReportTarget {
    pub socket: UdpSocket,
    pub peer: SocketAddr,
    pub ssrc: u32,
}

/// Every `interval`, send `GET_PARAMETER` on the control connection and a
/// receiver report toward the upstream RTCP port.
///
/// A failed keepalive ends the session; a failed RTCP send is only logged.
pub fn keepalive_loop(
    client: Arc<Mutex<RtspClient>>,
    uri: String,
    interval: Duration,
    stop: StopSignal,
    report: Option<ReportTarget>,
) {
    let mut ticks: u64 = 0;
    while !stop.wait_timeout(interval) {
        let result = client.lock().send(RtspRequest::new("GET_PARAMETER", &uri));
        if let Err(e) = result {
            tracing::warn!(uri = %uri, error = %e, "keepalive failed, stopping session");
            stop.stop();
            break;
        }
        ticks += 1;

        if let Some(report) = &report {
            let packet = rtcp::receiver_report(report.ssrc);
            if let Err(e) = report.socket.send_to(&packet, report.peer) {
                tracing::debug!(peer = %report.peer, error = %e, "RTCP receiver report failed");
            }
        }
    }

    tracing::debug!(ticks, "keepalive loop finished");
}
