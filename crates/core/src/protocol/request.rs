use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::headers::Headers;

/// Protocol version written on every outgoing request.
pub const RTSP_VERSION: &str = "RTSP/1.0";

/// An RTSP request (RFC 2326 §6).
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// The session engine builds these and serializes them; the proxy parses
/// client requests, rewrites the target and headers, and serializes them
/// back for the upstream.
#[derive(Debug, Clone)]
pub struct RtspRequest {
    /// RTSP method (OPTIONS, DESCRIBE, SETUP, PLAY, etc.).
    pub method: String,
    /// Request-URI (e.g. `rtsp://host:port/stream/track1`).
    pub uri: String,
    /// Protocol version (normally `RTSP/1.0`).
    pub version: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl RtspRequest {
    pub fn new(method: &str, uri: &str) -> Self {
        Self {
            method: method.to_string(),
            uri: uri.to_string(),
            version: RTSP_VERSION.to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Parse one complete request (head and body) as read off the wire.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (head, body) = split_head(raw)?;
        let mut lines = head.lines();

        let request_line = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or(RtspError::parse(ParseErrorKind::EmptyMessage))?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let [method, uri, version] = parts[..] else {
            return Err(RtspError::parse(ParseErrorKind::InvalidRequestLine));
        };

        Ok(RtspRequest {
            method: method.to_string(),
            uri: uri.to_string(),
            version: version.to_string(),
            headers: Headers::parse(lines)?,
            body: body.to_vec(),
        })
    }

    pub fn is_method(&self, method: &str) -> bool {
        self.method.eq_ignore_ascii_case(method)
    }

    /// Serialize to wire bytes. A non-empty body gets a `Content-Length`
    /// matching its actual size.
    pub fn serialize(&self) -> Vec<u8> {
        let mut head = format!("{} {} {}\r\n", self.method, self.uri, self.version);
        let mut headers = self.headers.clone();
        if !self.body.is_empty() {
            headers.set("Content-Length", &self.body.len().to_string());
        }
        headers.write_to(&mut head);
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

/// Split a raw message at the blank line into its UTF-8 head and the body.
pub(crate) fn split_head(raw: &[u8]) -> Result<(&str, &[u8])> {
    let (head, body) = match find_blank_line(raw) {
        Some(end) => (&raw[..end], &raw[end..]),
        None => (raw, &raw[raw.len()..]),
    };
    let head =
        std::str::from_utf8(head).map_err(|_| RtspError::parse(ParseErrorKind::InvalidEncoding))?;
    Ok((head, body))
}

/// Index just past the first `\r\n\r\n` (or bare `\n\n`), if any.
pub(crate) fn find_blank_line(buf: &[u8]) -> Option<usize> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| p + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options_request() {
        let raw = b"OPTIONS rtsp://localhost:8554/test RTSP/1.0\r\nCSeq: 1\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.method, "OPTIONS");
        assert_eq!(req.uri, "rtsp://localhost:8554/test");
        assert_eq!(req.version, "RTSP/1.0");
        assert_eq!(req.headers.get("CSeq"), Some("1"));
        assert!(req.body.is_empty());
    }

    #[test]
    fn parse_keeps_body() {
        let raw = b"SET_PARAMETER rtsp://h/s RTSP/1.0\r\nCSeq: 9\r\nContent-Length: 4\r\n\r\nab\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.body, b"ab\r\n");
    }

    #[test]
    fn parse_empty_request() {
        assert!(RtspRequest::parse(b"").is_err());
        assert!(RtspRequest::parse(b"\r\n\r\n").is_err());
    }

    #[test]
    fn parse_invalid_request_line() {
        assert!(RtspRequest::parse(b"JUST_A_METHOD\r\n\r\n").is_err());
    }

    #[test]
    fn serialize_builder_request() {
        let req = RtspRequest::new("DESCRIBE", "rtsp://10.0.0.5:554/stream1")
            .header("CSeq", "2")
            .header("Accept", "application/sdp");
        let text = String::from_utf8(req.serialize()).unwrap();
        assert_eq!(
            text,
            "DESCRIBE rtsp://10.0.0.5:554/stream1 RTSP/1.0\r\nCSeq: 2\r\nAccept: application/sdp\r\n\r\n"
        );
    }

    #[test]
    fn serialize_fixes_content_length() {
        let mut req = RtspRequest::new("SET_PARAMETER", "rtsp://h/s").header("Content-Length", "99");
        req.body = b"x: 1\r\n".to_vec();
        let text = String::from_utf8(req.serialize()).unwrap();
        assert!(text.contains("Content-Length: 6\r\n"));
        assert!(text.ends_with("\r\n\r\nx: 1\r\n"));
    }

    #[test]
    fn blank_line_detection() {
        assert_eq!(find_blank_line(b"A\r\n\r\nbody"), Some(5));
        assert_eq!(find_blank_line(b"A\n\nbody"), Some(3));
        assert_eq!(find_blank_line(b"A\r\nB: c\r\n"), None);
    }
}
