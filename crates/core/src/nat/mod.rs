//! NAT traversal helpers.
//!
//! RTSP negotiates UDP ports over TCP, so a receiver behind NAT advertises
//! ports the sender cannot reach. [`stun::StunClient`] asks a public STUN
//! server (RFC 5389 Binding) which public `ip:port` the NAT assigned to a
//! socket; that port is what gets advertised in `client_port=`.

pub mod stun;

pub use stun::{DEFAULT_STUN_SERVER, StunClient};
