use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use crate::error::{Result, RtspError};
use crate::media::rtp::{RtpHeader, TRIGGER_PAYLOAD_TYPE};
use crate::session::transport::PortPair;

/// Lowest even port the gateway picks for a session's RTP socket.
const SESSION_PORT_BASE: u16 = 10000;
/// Number of even ports above [`SESSION_PORT_BASE`] to choose from.
const SESSION_PORT_SLOTS: u16 = 25000;
/// Random pairs tried before giving up on binding a session's sockets.
const SESSION_BIND_ATTEMPTS: usize = 8;

/// A bound RTP/RTCP socket pair on adjacent local ports.
///
/// Both sockets listen on `0.0.0.0`. The RTP socket receives media (and, in
/// NAT mode, carries the STUN exchange that discovers its public mapping);
/// the RTCP socket sends receiver reports.
#[derive(Debug)]
pub struct UdpPair {
    pub rtp: UdpSocket,
    pub rtcp: UdpSocket,
    pub ports: PortPair,
}

impl UdpPair {
    /// Bind both sockets of `ports`. Fails if either port is taken.
    pub fn bind(ports: PortPair) -> io::Result<Self> {
        let rtp = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, ports.rtp))?;
        let rtcp = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, ports.rtcp))?;
        tracing::trace!(%ports, "bound UDP pair");
        Ok(Self { rtp, rtcp, ports })
    }

    /// Bind a pair at a random even port in 10000–59998.
    pub fn bind_random() -> Result<Self> {
        for _ in 0..SESSION_BIND_ATTEMPTS {
            let slot = rand::random::<u16>() % SESSION_PORT_SLOTS;
            let ports = PortPair::starting_at(SESSION_PORT_BASE + slot * 2);
            match Self::bind(ports) {
                Ok(pair) => return Ok(pair),
                Err(e) => tracing::debug!(%ports, error = %e, "UDP pair busy, retrying"),
            }
        }
        Err(RtspError::PortRangeExhausted)
    }
}

/// Send a header-only RTP packet from `socket` toward `peer`.
///
/// Opens a path through simple NATs and stateful firewalls so the upstream's
/// first media packet is not dropped.
pub fn send_trigger(socket: &UdpSocket, peer: SocketAddr, ssrc: u32) -> io::Result<()> {
    let packet = RtpHeader::new(TRIGGER_PAYLOAD_TYPE, ssrc).write(false);
    let sent = socket.send_to(&packet, peer)?;
    if sent != packet.len() {
        return Err(io::Error::new(io::ErrorKind::WriteZero, "short trigger write"));
    }
    Ok(())
}
