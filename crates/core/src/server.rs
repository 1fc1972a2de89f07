use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Result, RtspError};
use crate::gateway;
use crate::nat::{DEFAULT_STUN_SERVER, StunClient};
use crate::proxy::{PortAllocator, ProxyConnection};
use crate::transport::tcp;

/// Process-wide settings, built once at start-up and shared read-only
/// (behind an `Arc`) with every connection.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds.
    pub bind_host: IpAddr,
    /// Listener port (HTTP gateway or RTSP proxy).
    pub port: u16,
    /// Advertise the STUN-discovered public RTP port in gateway SETUPs.
    pub enable_nat: bool,
    /// Ring buffer slots per gateway session (one is always unused).
    pub max_rtp_buffer_size: usize,
    /// Size of one ring slot and of the UDP receive buffer.
    pub max_udp_packet_size: usize,
    /// `host:port` of the STUN server; `None` disables STUN entirely.
    pub stun_server: Option<String>,
    /// Send a header-only RTP packet upstream before PLAY data flows
    /// (ignored in NAT mode).
    pub send_trigger: bool,
    /// Interval between `GET_PARAMETER` keepalives on a playing session.
    pub keepalive_interval: Duration,
    /// Inclusive range the proxy allocates local RTP/RTCP pairs from.
    pub proxy_port_range: (u16, u16),
    /// Read/write timeout on upstream RTSP control connections.
    pub control_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3250,
            enable_nat: false,
            max_rtp_buffer_size: 8192,
            max_udp_packet_size: 1536,
            stun_server: Some(DEFAULT_STUN_SERVER.to_string()),
            send_trigger: true,
            keepalive_interval: Duration::from_secs(10),
            proxy_port_range: (20000, 60000),
            control_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ServerConfig {
    /// Reject values the data path cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_rtp_buffer_size < 2 {
            return Err(RtspError::InvalidConfig(
                "RTP buffer needs at least 2 slots".to_string(),
            ));
        }
        if self.max_udp_packet_size < 12 || self.max_udp_packet_size > 65535 {
            return Err(RtspError::InvalidConfig(format!(
                "UDP packet size {} outside 12..=65535",
                self.max_udp_packet_size
            )));
        }
        let (low, high) = self.proxy_port_range;
        if low % 2 != 0 || low >= high || high == u16::MAX {
            return Err(RtspError::InvalidConfig(format!(
                "proxy port range {low}-{high} must start even and be non-empty"
            )));
        }
        if self.enable_nat && self.stun_server.is_none() {
            return Err(RtspError::InvalidConfig(
                "NAT mode needs a STUN server".to_string(),
            ));
        }
        if self.keepalive_interval.is_zero() {
            return Err(RtspError::InvalidConfig(
                "keepalive interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.port)
    }

    /// STUN client for the configured server, if any.
    pub fn stun_client(&self) -> Option<StunClient> {
        self.stun_server.as_deref().map(StunClient::new)
    }
}

/// What accepted connections speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// `GET /rtp/<host>:<port>/<path>` over HTTP, answered with an RTP
    /// payload stream.
    Gateway,
    /// RTSP over TCP, relayed upstream with NAT-friendly port rewriting.
    Proxy,
}

/// Listener orchestrator for either role.
///
/// Owns the shared configuration and, for the proxy, the port allocator
/// injected into every connection. Delegates accepting to
/// [`transport::tcp`](crate::transport::tcp).
pub struct Server {
    role: Role,
    config: Arc<ServerConfig>,
    ports: Arc<PortAllocator>,
    running: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
    accept_thread: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new(role: Role) -> Self {
        Self::with_config(role, ServerConfig::default())
    }

    pub fn with_config(role: Role, config: ServerConfig) -> Self {
        let (low, high) = config.proxy_port_range;
        Self {
            role,
            ports: Arc::new(PortAllocator::new(low, high)),
            config: Arc::new(config),
            running: Arc::new(AtomicBool::new(false)),
            local_addr: None,
            accept_thread: None,
        }
    }

    /// Bind the listener and start accepting on a background thread.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }
        self.config.validate()?;

        let listener = TcpListener::bind(self.config.bind_addr())?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let config = self.config.clone();

        tracing::info!(role = ?self.role, addr = %local_addr, "listening");

        let accept_thread = match self.role {
            Role::Gateway => thread::spawn(move || {
                tcp::accept_loop(listener, running, move |stream, peer| {
                    gateway::handle_client(stream, peer, &config);
                });
            }),
            Role::Proxy => {
                let ports = self.ports.clone();
                thread::spawn(move || {
                    tcp::accept_loop(listener, running, move |stream, peer| {
                        ProxyConnection::handle(stream, peer, config.clone(), &ports);
                    });
                })
            }
        };
        self.accept_thread = Some(accept_thread);

        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("server stopping");
    }

    /// Block until the accept loop exits.
    pub fn wait(&mut self) -> Result<()> {
        let handle = self.accept_thread.take().ok_or(RtspError::NotStarted)?;
        if handle.join().is_err() {
            tracing::error!("accept loop panicked");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the server's configuration.
    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }
}
