use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::cancel::StopSignal;

/// Read timeout so the relay notices its connection's stop signal.
pub const RELAY_POLL: Duration = Duration::from_millis(200);

/// Largest datagram the relay forwards.
const RELAY_BUFFER_SIZE: usize = 65535;

/// One-way UDP forwarder from the proxy's RTP port to the real client.
#[derive(Debug)]
pub struct Relay {
    /// Independent handle on the connection's bound RTP socket.
    pub socket: UdpSocket,
    /// Upstream RTP sender, for logging only.
    pub upstream: SocketAddr,
    /// Client source address with its originally requested RTP port.
    pub client: SocketAddr,
}

impl Relay {
    /// Run the relay on its own thread until `stop` is raised or the socket
    /// fails.
    pub fn spawn(self, stop: StopSignal) -> io::Result<JoinHandle<()>> {
        self.socket.set_read_timeout(Some(RELAY_POLL))?;
        thread::Builder::new()
            .name(format!("relay-{}", self.client))
            .spawn(move || self.run(&stop))
    }

    fn run(self, stop: &StopSignal) {
        tracing::info!(upstream = %self.upstream, client = %self.client, "one-way relay started");

        let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
        let mut forwarded: u64 = 0;

        while !stop.is_stopped() {
            let len = match self.socket.recv_from(&mut buf) {
                Ok((len, _)) => len,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(client = %self.client, error = %e, "relay socket failed");
                    break;
                }
            };

            match self.socket.send_to(&buf[..len], self.client) {
                Ok(_) => forwarded += 1,
                Err(e) => tracing::debug!(client = %self.client, error = %e, "relay send failed"),
            }
        }

        tracing::info!(client = %self.client, forwarded, "one-way relay stopped");
    }
}
