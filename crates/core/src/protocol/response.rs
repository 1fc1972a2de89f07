use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::headers::Headers;
use crate::protocol::request::split_head;

/// A parsed RTSP response (RFC 2326 §7).
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 3\r\n
/// Session: 12345678;timeout=60\r\n
/// Transport: RTP/AVP;unicast;client_port=5000-5001;server_port=6970-6971\r\n
/// \r\n
/// ```
///
/// The status code is the integer following `RTSP/<version>`; the reason
/// phrase is kept for logging only.
#[derive(Debug, Clone)]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// 200 OK — success (RFC 2326 §7.1.1).
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    #[must_use]
    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (head, body) = split_head(raw)?;
        let mut lines = head.lines();

        let status_line = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or(RtspError::parse(ParseErrorKind::EmptyMessage))?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("RTSP/") {
            return Err(RtspError::parse(ParseErrorKind::InvalidStatusLine));
        }
        let status_code = parts
            .next()
            .and_then(|code| code.trim().parse::<u16>().ok())
            .ok_or(RtspError::parse(ParseErrorKind::InvalidStatusLine))?;
        let status_text = parts.next().unwrap_or_default().trim().to_string();

        Ok(RtspResponse {
            status_code,
            status_text,
            headers: Headers::parse(lines)?,
            body: body.to_vec(),
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Fail with [`RtspError::Status`] unless the status is 2xx.
    pub fn require_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(RtspError::Status(self.status_code))
        }
    }

    /// Serialize to the RTSP wire format; `Content-Length` is appended
    /// automatically when a body is present (RFC 2326 §12.14).
    pub fn serialize(&self) -> Vec<u8> {
        let mut head = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_setup_response() {
        let raw = b"RTSP/1.0 200 OK\r\n\
                    CSeq: 3\r\n\
                    session: 66334873;timeout=60\r\n\
                    Transport: RTP/AVP;unicast;client_port=5000-5001;server_port=6970-6971\r\n\r\n";
        let resp = RtspResponse::parse(raw).unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.status_text, "OK");
        assert!(resp.is_success());
        assert_eq!(resp.headers.get("Session"), Some("66334873;timeout=60"));
    }

    #[test]
    fn status_follows_any_version() {
        let resp = RtspResponse::parse(b"RTSP/2.0 454 Session Not Found\r\n\r\n").unwrap();
        assert_eq!(resp.status_code, 454);
        assert_eq!(resp.status_text, "Session Not Found");
        assert!(matches!(resp.require_success(), Err(RtspError::Status(454))));
    }

    #[test]
    fn rejects_non_rtsp_status_line() {
        assert!(RtspResponse::parse(b"HTTP/1.1 200 OK\r\n\r\n").is_err());
        assert!(RtspResponse::parse(b"RTSP/1.0 abc\r\n\r\n").is_err());
        assert!(RtspResponse::parse(b"").is_err());
    }

    #[test]
    fn serialize_round_trips_body() {
        let resp = RtspResponse::ok()
            .add_header("CSeq", "2")
            .add_header("Content-Type", "application/sdp")
            .with_body("v=0\r\n");
        let bytes = resp.serialize();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("RTSP/1.0 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        let parsed = RtspResponse::parse(&bytes).unwrap();
        assert_eq!(parsed.body, b"v=0\r\n");
        assert_eq!(parsed.headers.get("cseq"), Some("2"));
    }
}
