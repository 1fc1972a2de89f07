//! Gateway-side RTSP session engine (RFC 2326 client role).
//!
//! One [`PlaySession`] serves one HTTP viewer. It negotiates a unicast UDP
//! stream with the upstream server over a single control connection:
//!
//! ```text
//! Init ──OPTIONS──> OptionsSent ──DESCRIBE──> Described ──SETUP──> SetUp
//!      ──PLAY──> Playing ──(viewer gone / upstream error)──> TearingDown ──> Closed
//! ```
//!
//! Once playing, three worker threads ([`worker`]) move RTP payloads from
//! the UDP socket to the viewer and keep the upstream session alive. Any
//! failed step ends the session; the viewer sees only a closed connection.

pub mod client;
pub mod transport;
pub mod worker;

use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::cancel::StopSignal;
use crate::error::{Result, RtspError};
use crate::media::ring_buffer;
use crate::protocol::{RtspRequest, StreamTarget};
use crate::server::ServerConfig;
use crate::transport::UdpPair;

pub use client::RtspClient;
pub use transport::{PortPair, TransportHeader};

use worker::{ReportTarget, Trigger};

/// Where a gateway session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    OptionsSent,
    Described,
    SetUp,
    Playing,
    TearingDown,
    Closed,
}

/// What the request sequence learned from the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    /// URI for `GET_PARAMETER` and `TEARDOWN`: Content-Base, else
    /// Content-Location, else the stream URL.
    pub control_uri: String,
    /// Upstream RTP/RTCP ports from the SETUP response, if it named them.
    pub server_port: Option<PortPair>,
}

/// One gateway viewer's upstream RTSP session.
pub struct PlaySession {
    target: StreamTarget,
    config: Arc<ServerConfig>,
    state: SessionState,
    ssrc: u32,
}

impl PlaySession {
    pub fn new(target: StreamTarget, config: Arc<ServerConfig>) -> Self {
        Self {
            target,
            config,
            state: SessionState::Init,
            ssrc: rand::random(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn set_state(&mut self, state: SessionState) {
        tracing::debug!(target_url = %self.target, old_state = ?self.state, new_state = ?state, "state transition");
        self.state = state;
    }

    /// Negotiate the stream and relay its payloads to `viewer` until either
    /// side goes away.
    pub fn run<W: Write + Send + 'static>(mut self, viewer: W) -> Result<()> {
        let sockets = UdpPair::bind_random()?;
        let advertised = self.advertised_ports(&sockets)?;

        let mut client = RtspClient::connect(&self.target, self.config.control_timeout)?;
        let upstream_ip = client.peer_addr()?.ip();

        let negotiated = match self.negotiate(&mut client, advertised) {
            Ok(negotiated) => negotiated,
            Err(e) => {
                if client.session_id().is_some() {
                    let uri = self.target.url();
                    self.teardown(&mut client, &uri);
                }
                self.set_state(SessionState::Closed);
                return Err(e);
            }
        };

        tracing::info!(
            target_url = %self.target,
            local = %sockets.ports,
            advertised = %advertised,
            server_port = ?negotiated.server_port,
            "session playing"
        );

        let client = Arc::new(Mutex::new(client));
        let stop = StopSignal::new();
        let workers = self.spawn_workers(sockets, upstream_ip, &negotiated, client.clone(), viewer, &stop);

        let result = match workers {
            Ok(handles) => {
                for handle in handles {
                    if handle.join().is_err() {
                        tracing::error!("session worker panicked");
                    }
                }
                Ok(())
            }
            Err(e) => {
                stop.stop();
                Err(e)
            }
        };

        self.set_state(SessionState::TearingDown);
        self.teardown(&mut *client.lock(), &negotiated.control_uri);
        self.set_state(SessionState::Closed);

        result
    }

    /// Port pair announced in SETUP: the local one, or the STUN-mapped RTP
    /// port in NAT mode.
    fn advertised_ports(&self, sockets: &UdpPair) -> Result<PortPair> {
        if !self.config.enable_nat {
            return Ok(sockets.ports);
        }
        let Some(stun) = self.config.stun_client() else {
            return Ok(sockets.ports);
        };
        let mapped = stun.mapped_address(&sockets.rtp)?;
        tracing::debug!(local = sockets.ports.rtp, public = %mapped, "STUN mapping");
        Ok(PortPair::starting_at(mapped.port()))
    }

    /// Run OPTIONS, DESCRIBE, SETUP and PLAY in order, stopping at the first
    /// failure.
    pub fn negotiate<S: Read + Write>(
        &mut self,
        client: &mut RtspClient<S>,
        ports: PortPair,
    ) -> Result<Negotiated> {
        let url = self.target.url();

        client.send(RtspRequest::new("OPTIONS", &url))?;
        self.set_state(SessionState::OptionsSent);

        let describe = client.send(RtspRequest::new("DESCRIBE", &url).header("Accept", "application/sdp"))?;
        let control_uri = describe
            .headers
            .get("Content-Base")
            .or_else(|| describe.headers.get("Content-Location"))
            .map(str::to_string)
            .unwrap_or_else(|| url.clone());
        self.set_state(SessionState::Described);

        let setup = client.send(
            RtspRequest::new("SETUP", &url).header("Transport", &TransportHeader::unicast_request(ports)),
        )?;
        let session = setup
            .headers
            .get("Session")
            .ok_or(RtspError::MissingHeader("Session"))?;
        client.set_session_id(session);
        let server_port = setup
            .headers
            .get("Transport")
            .and_then(|value| TransportHeader::parse(value).server_port);
        if server_port.is_none() {
            tracing::warn!(target_url = %self.target, "SETUP response names no server_port");
        }
        self.set_state(SessionState::SetUp);

        client.send(RtspRequest::new("PLAY", &url).header("Range", "npt=0.000-"))?;
        self.set_state(SessionState::Playing);

        Ok(Negotiated {
            control_uri,
            server_port,
        })
    }

    fn spawn_workers<W: Write + Send + 'static>(
        &self,
        sockets: UdpPair,
        upstream_ip: IpAddr,
        negotiated: &Negotiated,
        client: Arc<Mutex<RtspClient>>,
        viewer: W,
        stop: &StopSignal,
    ) -> Result<Vec<JoinHandle<()>>> {
        let UdpPair { rtp, rtcp, .. } = sockets;
        let config = &self.config;
        let (producer, consumer) = ring_buffer(config.max_rtp_buffer_size, config.max_udp_packet_size);

        let trigger = match negotiated.server_port {
            Some(ports) if config.send_trigger && !config.enable_nat => Some(Trigger {
                peer: SocketAddr::new(upstream_ip, ports.rtp),
                ssrc: self.ssrc,
            }),
            _ => None,
        };
        let report = negotiated.server_port.map(|ports| ReportTarget {
            socket: rtcp,
            peer: SocketAddr::new(upstream_ip, ports.rtcp),
            ssrc: self.ssrc,
        });

        let mut handles = Vec::with_capacity(3);

        let receive_stop = stop.clone();
        let max_packet_size = config.max_udp_packet_size;
        handles.push(
            thread::Builder::new()
                .name("rtp-receive".to_string())
                .spawn(move || worker::receive_loop(rtp, producer, receive_stop, trigger, max_packet_size))?,
        );

        let send_stop = stop.clone();
        handles.push(
            thread::Builder::new()
                .name("http-send".to_string())
                .spawn(move || worker::send_loop(viewer, consumer, send_stop))?,
        );

        let keepalive_stop = stop.clone();
        let uri = negotiated.control_uri.clone();
        let interval = config.keepalive_interval;
        handles.push(
            thread::Builder::new()
                .name("rtsp-keepalive".to_string())
                .spawn(move || worker::keepalive_loop(client, uri, interval, keepalive_stop, report))?,
        );

        Ok(handles)
    }

    /// Best-effort TEARDOWN; failures are only logged.
    fn teardown<S: Read + Write>(&self, client: &mut RtspClient<S>, uri: &str) {
        match client.send(RtspRequest::new("TEARDOWN", uri)) {
            Ok(_) => tracing::debug!(uri, "session torn down"),
            Err(e) => tracing::debug!(uri, error = %e, "TEARDOWN failed"),
        }
    }
}
