//! RTP data plane.
//!
//! - [`rtp`]: classifies received datagrams and extracts RTP payloads
//!   (RFC 3550 §5.1); also builds the header-only trigger packet.
//! - [`rtcp`]: empty Receiver Report builder.
//! - [`ring`]: the bounded single-producer/single-consumer queue that
//!   decouples UDP receive from the HTTP send path.
//!
//! Payloads are forwarded verbatim. Nothing here depacketizes codecs, so an
//! HTTP viewer receives whatever the upstream carries inside RTP (usually
//! MPEG-TS for IPTV-style sources).

pub mod ring;
pub mod rtcp;
pub mod rtp;

pub use ring::{Consumer, Producer, PushError, ring_buffer};
pub use rtp::{Datagram, RtpHeader};
