use std::fmt;

use crate::error::{Result, RtspError};

/// Default RTSP port (RFC 2326 §3.2).
pub const DEFAULT_RTSP_PORT: u16 = 554;

/// Path prefix of the `/rtp/<host>:<port>/<path>` shorthand.
const RTP_PREFIX: &str = "/rtp/";

/// Upstream RTSP source a client asked for.
///
/// Two spellings are accepted:
///
/// - the shorthand `/rtp/<host>:<port>/<path>`, either bare (HTTP ingress)
///   or behind any `rtsp://authority` (proxy ingress, where the authority is
///   the proxy itself);
/// - a standard `rtsp://host[:port]/path` naming the upstream directly.
///
/// [`url`](Self::url) renders the absolute URL sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub host: String,
    pub port: u16,
    /// Path without its leading `/`.
    pub path: String,
}

impl StreamTarget {
    /// Parse the `/rtp/<host>:<port>/<path>` shorthand.
    pub fn from_shorthand(target: &str) -> Result<Self> {
        let rest = target
            .strip_prefix(RTP_PREFIX)
            .ok_or_else(|| invalid(target))?;
        let (authority, path) = rest.split_once('/').ok_or_else(|| invalid(target))?;
        let (host, port) = authority.rsplit_once(':').ok_or_else(|| invalid(target))?;
        let port = parse_port(port).ok_or_else(|| invalid(target))?;

        if host.is_empty() || path.is_empty() {
            return Err(invalid(target));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// Parse a request target as seen by the proxy: either spelling.
    pub fn from_request_uri(uri: &str) -> Result<Self> {
        if uri.starts_with(RTP_PREFIX) {
            return Self::from_shorthand(uri);
        }

        let rest = uri
            .strip_prefix("rtsp://")
            .ok_or_else(|| invalid(uri))?;
        let (authority, path) = match rest.find('/') {
            Some(slash) => (&rest[..slash], &rest[slash..]),
            None => (rest, ""),
        };

        if path.starts_with(RTP_PREFIX) {
            return Self::from_shorthand(path);
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, parse_port(port).ok_or_else(|| invalid(uri))?),
            None => (authority, DEFAULT_RTSP_PORT),
        };
        if host.is_empty() {
            return Err(invalid(uri));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.trim_start_matches('/').to_string(),
        })
    }

    /// Absolute upstream URL, `rtsp://host:port/path`.
    pub fn url(&self) -> String {
        format!("rtsp://{}:{}/{}", self.host, self.port, self.path)
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

fn parse_port(port: &str) -> Option<u16> {
    port.parse::<u16>().ok().filter(|p| *p != 0)
}

fn invalid(uri: &str) -> RtspError {
    RtspError::InvalidUri(uri.to_string())
}
