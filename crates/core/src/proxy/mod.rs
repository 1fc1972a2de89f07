//! NAT-punching RTSP proxy.
//!
//! A client behind NAT speaks RTSP to the proxy as if it were the source:
//!
//! ```text
//! client ──RTSP/TCP──> proxy ──RTSP/TCP──> upstream
//!                        │  SETUP client_port=5000-5001
//!                        │     rewritten to the proxy's own (STUN-mapped) pair
//! client <──UDP relay── proxy <──RTP/UDP── upstream
//! ```
//!
//! Each connection binds a fresh even port pair from the shared
//! [`PortAllocator`]. Request targets are rewritten to the absolute upstream
//! URL; everything else passes through unchanged. After a `200` answer to
//! `PLAY`, a [`Relay`] forwards the RTP arriving on the proxy's port to the
//! client's originally requested port.

pub mod ports;
pub mod relay;

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::cancel::StopSignal;
use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::{RtspRequest, RtspResponse, StreamTarget};
use crate::server::ServerConfig;
use crate::session::transport::{self, PortPair, TransportHeader};
use crate::transport::UdpPair;
use crate::transport::tcp::{MessageReader, PROXY_MESSAGE_LIMIT};

pub use ports::PortAllocator;
pub use relay::Relay;

/// Result of rewriting one client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// Upstream the request now addresses.
    pub target: StreamTarget,
    /// `client_port` the client asked for in a SETUP, before rewriting.
    pub client_port: Option<PortPair>,
}

/// Point `request` at its absolute upstream URL and, for SETUP, replace the
/// Transport `client_port` with `advertised`.
///
/// ```
/// use rtspunch::protocol::RtspRequest;
/// use rtspunch::proxy::rewrite_request;
/// use rtspunch::session::PortPair;
///
/// let mut setup = RtspRequest::new("SETUP", "rtsp://proxy:8554/rtp/10.0.0.5:554/ch1")
///     .header("Transport", "RTP/AVP/UDP;unicast;client_port=5000-5001");
/// let rewrite = rewrite_request(&mut setup, PortPair::starting_at(30010)).unwrap();
///
/// assert_eq!(setup.uri, "rtsp://10.0.0.5:554/ch1");
/// assert_eq!(setup.headers.get("Transport"), Some("RTP/AVP/UDP;unicast;client_port=30010-30011"));
/// assert_eq!(rewrite.client_port, Some(PortPair::starting_at(5000)));
/// ```
pub fn rewrite_request(request: &mut RtspRequest, advertised: PortPair) -> Result<Rewrite> {
    let target = StreamTarget::from_request_uri(&request.uri)?;
    request.uri = target.url();

    let mut client_port = None;
    if request.is_method("SETUP")
        && let Some(value) = request.headers.get("Transport")
    {
        client_port = TransportHeader::parse(value).client_port;
        let rewritten = transport::rewrite_client_port(value, advertised);
        request.headers.set("Transport", &rewritten);
    }

    Ok(Rewrite {
        target,
        client_port,
    })
}

/// State of one proxied client connection.
pub struct ProxyConnection {
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    sockets: UdpPair,
    advertised: PortPair,
    client_port: Option<PortPair>,
    server_port: Option<PortPair>,
    upstream: Option<MessageReader<TcpStream>>,
    stop: StopSignal,
    relay: Option<JoinHandle<()>>,
}

impl ProxyConnection {
    /// Serve one accepted client connection to completion.
    pub fn handle(stream: TcpStream, peer: SocketAddr, config: Arc<ServerConfig>, ports: &PortAllocator) {
        let sockets = match ports.bind() {
            Ok(sockets) => sockets,
            Err(e) => {
                tracing::error!(%peer, error = %e, "failed to bind proxy UDP ports");
                return;
            }
        };

        tracing::info!(%peer, local = %sockets.ports, "proxy client connected");

        let mut connection = Self::new(peer, config, sockets);
        if let Err(e) = connection.serve(stream) {
            tracing::warn!(%peer, error = %e, "proxy connection failed");
        }
        connection.close();

        tracing::info!(%peer, "proxy client disconnected");
    }

    /// Wrap bound sockets, resolving the RTP port's public mapping when a
    /// STUN server is configured.
    pub fn new(peer: SocketAddr, config: Arc<ServerConfig>, sockets: UdpPair) -> Self {
        let advertised = match config.stun_client() {
            Some(stun) => match stun.mapped_address(&sockets.rtp) {
                Ok(mapped) => {
                    tracing::info!(local = sockets.ports.rtp, public = %mapped, "public mapping obtained");
                    PortPair::starting_at(mapped.port())
                }
                Err(e) => {
                    tracing::warn!(error = %e, "STUN failed, advertising local ports");
                    sockets.ports
                }
            },
            None => sockets.ports,
        };

        Self {
            peer,
            config,
            sockets,
            advertised,
            client_port: None,
            server_port: None,
            upstream: None,
            stop: StopSignal::new(),
            relay: None,
        }
    }

    /// Ports written into rewritten SETUP requests.
    pub fn advertised(&self) -> PortPair {
        self.advertised
    }

    /// `client_port` of the client's last SETUP, before rewriting.
    pub fn client_port(&self) -> Option<PortPair> {
        self.client_port
    }

    /// `server_port` last seen in an upstream response.
    pub fn server_port(&self) -> Option<PortPair> {
        self.server_port
    }

    /// Where relayed RTP goes: the client's source address at its requested
    /// RTP port, or at the proxy's own port number when it never said.
    pub fn relay_target(&self) -> SocketAddr {
        let port = self.client_port.map_or(self.sockets.ports.rtp, |p| p.rtp);
        SocketAddr::new(self.peer.ip(), port)
    }

    /// Pump request/response pairs between client and upstream until either
    /// side closes.
    pub fn serve(&mut self, client: TcpStream) -> Result<()> {
        let mut requests = MessageReader::new(client.try_clone()?, PROXY_MESSAGE_LIMIT);
        let mut client = client;

        while let Some(raw) = requests.read_message()? {
            let (outgoing, method) = self.prepare(&raw)?;

            let upstream = self.upstream.as_mut().ok_or(RtspError::NotStarted)?;
            let stream = upstream.get_mut();
            stream.write_all(&outgoing)?;
            stream.flush()?;

            let response = upstream
                .read_message()?
                .ok_or(RtspError::parse(ParseErrorKind::Truncated))?;
            client.write_all(&response)?;
            client.flush()?;

            self.inspect_response(&response, method.as_deref());
        }

        Ok(())
    }

    /// Rewrite one client message for the upstream.
    ///
    /// The first message must be a rewritable request; later messages that
    /// do not parse, or name no upstream, pass through untouched.
    fn prepare(&mut self, raw: &[u8]) -> Result<(Vec<u8>, Option<String>)> {
        let first = self.upstream.is_none();

        let mut request = match RtspRequest::parse(raw) {
            Ok(request) => request,
            Err(e) if first => return Err(e),
            Err(_) => return Ok((raw.to_vec(), None)),
        };
        let method = request.method.clone();

        match rewrite_request(&mut request, self.advertised) {
            Ok(rewrite) => {
                if let Some(original) = rewrite.client_port {
                    tracing::info!(
                        original = %original,
                        rewritten = %self.advertised,
                        "rewrote SETUP client_port"
                    );
                    self.client_port = Some(original);
                }
                if first {
                    tracing::info!(upstream = %rewrite.target, "upstream resolved");
                    self.connect(&rewrite.target)?;
                }
                Ok((request.serialize(), Some(method)))
            }
            Err(e) if first => Err(e),
            Err(_) => Ok((raw.to_vec(), Some(method))),
        }
    }

    fn connect(&mut self, target: &StreamTarget) -> Result<()> {
        let stream = TcpStream::connect(target.authority())?;
        stream.set_read_timeout(self.config.control_timeout)?;
        stream.set_write_timeout(self.config.control_timeout)?;
        tracing::info!(upstream = %target.authority(), "connected to upstream RTSP");
        self.upstream = Some(MessageReader::new(stream, PROXY_MESSAGE_LIMIT));
        Ok(())
    }

    fn inspect_response(&mut self, raw: &[u8], method: Option<&str>) {
        let Ok(response) = RtspResponse::parse(raw) else {
            return;
        };

        if let Some(ports) = response
            .headers
            .get("Transport")
            .and_then(|value| TransportHeader::parse(value).server_port)
        {
            tracing::debug!(server_port = %ports, "upstream server ports");
            self.server_port = Some(ports);
        }

        let is_play = method.is_some_and(|m| m.eq_ignore_ascii_case("PLAY"));
        if !is_play {
            return;
        }
        if response.status_code != 200 {
            tracing::info!(status = response.status_code, "PLAY refused, relay not started");
            return;
        }
        self.start_relay();
    }

    fn start_relay(&mut self) {
        if self.relay.is_some() {
            return;
        }
        let Some(server_port) = self.server_port else {
            tracing::info!("PLAY without known server_port, relay not started");
            return;
        };

        let upstream_ip = match self.upstream.as_ref().map(|u| u.get_ref().peer_addr()) {
            Some(Ok(addr)) => addr.ip(),
            _ => return,
        };

        let socket = match self.sockets.rtp.try_clone() {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!(error = %e, "failed to duplicate RTP socket for relay");
                return;
            }
        };

        let relay = Relay {
            socket,
            upstream: SocketAddr::new(upstream_ip, server_port.rtp),
            client: self.relay_target(),
        };
        match relay.spawn(self.stop.clone()) {
            Ok(handle) => self.relay = Some(handle),
            Err(e) => tracing::error!(error = %e, "failed to start relay"),
        }
    }

    /// Stop the relay and drop every socket of this connection.
    pub fn close(&mut self) {
        self.stop.stop();
        if let Some(relay) = self.relay.take()
            && relay.join().is_err()
        {
            tracing::error!(peer = %self.peer, "relay thread panicked");
        }
        self.upstream = None;
    }
}
