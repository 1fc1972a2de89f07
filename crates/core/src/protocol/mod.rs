//! RTSP message model (RFC 2326).
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://10.0.0.5:554/stream1 RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! The same types serve both roles of this crate: the gateway builds
//! requests and parses responses as an RTSP client, and the proxy parses
//! client requests, rewrites them and forwards them upstream. Header lookup
//! is case-insensitive everywhere ([`Headers`]).
//!
//! | Method | RFC section | Used for |
//! |--------|-------------|----------|
//! | OPTIONS | §10.1 | Capability probe |
//! | DESCRIBE | §10.2 | SDP and the control base URL |
//! | SETUP | §10.4 | Negotiate the UDP port pair |
//! | PLAY | §10.5 | Start media delivery |
//! | TEARDOWN | §10.7 | End the upstream session |
//! | GET_PARAMETER | §10.8 | Keepalive |

pub mod headers;
pub mod request;
pub mod response;
pub mod uri;

pub use headers::Headers;
pub use request::RtspRequest;
pub use response::RtspResponse;
pub use uri::StreamTarget;
