//! Network transport layer for RTSP signaling and RTP media.
//!
//! RTSP uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries RTSP (and the gateway's HTTP) signaling.
//!   One thread per accepted connection; [`tcp::MessageReader`] frames
//!   messages on both the client and the upstream side.
//!
//! - **UDP** ([`udp`]): carries RTP/RTCP. Each gateway session and each
//!   proxy connection binds its own adjacent port pair.

pub mod tcp;
pub mod udp;

pub use tcp::MessageReader;
pub use udp::UdpPair;
