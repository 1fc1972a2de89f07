use std::net::IpAddr;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use rtspunch::nat::DEFAULT_STUN_SERVER;
use rtspunch::{Role, Server, ServerConfig};

#[derive(Parser)]
#[command(
    name = "rtspunch",
    about = "RTSP/RTP to HTTP gateway and NAT-punching RTSP proxy"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve `GET /rtp/<host>:<port>/<path>` as a raw RTP payload stream
    Http {
        /// Listen port
        #[arg(long, short, default_value_t = 3250)]
        port: u16,

        /// Advertise the STUN-mapped public RTP port in SETUP
        #[arg(long, short = 'n')]
        enable_nat: bool,

        /// Ring buffer slots per session
        #[arg(long = "set-rtp-buffer-size", short = 'r', default_value_t = 8192)]
        rtp_buffer_size: usize,

        /// Largest UDP datagram accepted from the upstream
        #[arg(long = "set-max-udp-packet-size", short = 'u', default_value_t = 1536)]
        max_udp_packet_size: usize,

        /// Skip the header-only RTP packet sent upstream before media flows
        #[arg(long)]
        no_trigger: bool,

        /// Seconds between GET_PARAMETER keepalives
        #[arg(long, default_value_t = 10)]
        keepalive: u64,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Relay RTSP to the upstream named in each request, rewriting SETUP ports
    Proxy {
        /// Listen port
        #[arg(long, short, default_value_t = 8554)]
        port: u16,

        /// First local RTP port handed to proxied sessions
        #[arg(long, default_value_t = 20000)]
        port_min: u16,

        /// Last local RTP port before wrapping around
        #[arg(long, default_value_t = 60000)]
        port_max: u16,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// STUN server used to discover public port mappings
    #[arg(long, default_value = DEFAULT_STUN_SERVER)]
    stun_server: String,

    /// Never contact a STUN server
    #[arg(long, conflicts_with = "stun_server")]
    no_stun: bool,
}

impl CommonArgs {
    fn apply(self, config: &mut ServerConfig) {
        config.bind_host = self.bind;
        config.stun_server = (!self.no_stun).then_some(self.stun_server);
    }
}

impl Command {
    fn into_config(self) -> (Role, ServerConfig) {
        let mut config = ServerConfig::default();
        match self {
            Command::Http {
                port,
                enable_nat,
                rtp_buffer_size,
                max_udp_packet_size,
                no_trigger,
                keepalive,
                common,
            } => {
                config.port = port;
                config.enable_nat = enable_nat;
                config.max_rtp_buffer_size = rtp_buffer_size;
                config.max_udp_packet_size = max_udp_packet_size;
                config.send_trigger = !no_trigger;
                config.keepalive_interval = Duration::from_secs(keepalive);
                common.apply(&mut config);
                (Role::Gateway, config)
            }
            Command::Proxy {
                port,
                port_min,
                port_max,
                common,
            } => {
                config.port = port;
                config.proxy_port_range = (port_min, port_max);
                common.apply(&mut config);
                (Role::Proxy, config)
            }
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let (role, config) = Cli::parse().command.into_config();
    let mut server = Server::with_config(role, config);

    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return ExitCode::FAILURE;
    }

    if let Some(addr) = server.local_addr() {
        tracing::info!(role = ?role, %addr, "rtspunch ready");
    }

    match server.wait() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server stopped abnormally");
            ExitCode::FAILURE
        }
    }
}
