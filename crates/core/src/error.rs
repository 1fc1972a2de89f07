//! Error types for the gateway and proxy.

use std::fmt;

/// Errors that can occur anywhere in the gateway or proxy.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Transport**: [`Io`](Self::Io) — bind/connect/send/recv failures.
/// - **Protocol**: [`Parse`](Self::Parse), [`Status`](Self::Status),
///   [`MissingHeader`](Self::MissingHeader), [`InvalidUri`](Self::InvalidUri).
/// - **Media**: [`MalformedRtp`](Self::MalformedRtp).
/// - **NAT discovery**: [`Stun`](Self::Stun).
/// - **Server**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning),
///   [`InvalidConfig`](Self::InvalidConfig).
///
/// None of these is ever reported to a remote peer. Failure shows up on the
/// wire only as a closed connection or a terminated HTTP body.
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an RTSP or HTTP message.
    #[error("parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// Upstream answered with a non-2xx status code.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// A response lacked a header the session cannot continue without.
    #[error("missing {0} header")]
    MissingHeader(&'static str),

    /// A request target could not be mapped to an upstream RTSP URL.
    #[error("invalid stream URI: {0}")]
    InvalidUri(String),

    /// A datagram claimed to be RTP but its header is inconsistent.
    #[error("malformed RTP packet: {kind}")]
    MalformedRtp { kind: RtpErrorKind },

    /// STUN binding discovery failed.
    #[error("STUN failure: {kind}")]
    Stun { kind: StunErrorKind },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// [`Server::wait`](crate::Server::wait) was called before `start`.
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,

    /// No UDP port pair in the configured range could be bound.
    #[error("local UDP port range exhausted")]
    PortRangeExhausted,
}

/// Specific kind of text-protocol parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty (no start line).
    EmptyMessage,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// Status line did not have the expected `RTSP/<ver> <code>` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// The message head is not valid UTF-8.
    InvalidEncoding,
    /// The peer closed the connection before the message was complete.
    Truncated,
    /// The message exceeded the reader's size limit.
    TooLarge,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidEncoding => write!(f, "message head is not UTF-8"),
            Self::Truncated => write!(f, "connection closed mid-message"),
            Self::TooLarge => write!(f, "message too large"),
        }
    }
}

/// Reason an RTP datagram was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtpErrorKind {
    /// The extension header runs past the end of the datagram.
    TruncatedExtension,
    /// Computed payload length is zero, negative, or overruns the datagram.
    InvalidPayloadLength,
}

impl fmt::Display for RtpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TruncatedExtension => write!(f, "extension header truncated"),
            Self::InvalidPayloadLength => write!(f, "invalid payload length"),
        }
    }
}

/// Reason a STUN binding lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StunErrorKind {
    /// The STUN server name did not resolve to an IPv4 address.
    Resolve,
    /// No valid response arrived in any attempt.
    Timeout,
    /// The response was shorter than a STUN header.
    ShortResponse,
    /// The magic cookie did not match.
    BadCookie,
    /// The echoed transaction id did not match the request.
    TransactionMismatch,
    /// The mapped address is not IPv4.
    UnsupportedFamily,
    /// Neither XOR-MAPPED-ADDRESS nor MAPPED-ADDRESS was present.
    NoMappedAddress,
}

impl fmt::Display for StunErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve => write!(f, "server did not resolve to IPv4"),
            Self::Timeout => write!(f, "no response"),
            Self::ShortResponse => write!(f, "response too short"),
            Self::BadCookie => write!(f, "bad magic cookie"),
            Self::TransactionMismatch => write!(f, "transaction id mismatch"),
            Self::UnsupportedFamily => write!(f, "address family not IPv4"),
            Self::NoMappedAddress => write!(f, "no mapped address attribute"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;

impl RtspError {
    pub(crate) fn parse(kind: ParseErrorKind) -> Self {
        Self::Parse { kind }
    }

    pub(crate) fn stun(kind: StunErrorKind) -> Self {
        Self::Stun { kind }
    }
}
