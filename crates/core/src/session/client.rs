use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::{RtspRequest, RtspResponse, StreamTarget};
use crate::transport::tcp::{MessageReader, SESSION_MESSAGE_LIMIT};

/// Client side of one persistent RTSP control connection.
///
/// Every request gets the next CSeq (starting at 1) and, once SETUP has
/// produced one, the `Session` header. Exactly one response is read per
/// request; any non-2xx status is an error.
pub struct RtspClient<S = TcpStream> {
    reader: MessageReader<S>,
    cseq: u32,
    session_id: Option<String>,
}

impl RtspClient<TcpStream> {
    /// Open the control connection to `target`.
    pub fn connect(target: &StreamTarget, timeout: Option<Duration>) -> Result<Self> {
        let stream = TcpStream::connect(target.authority())?;
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        stream.set_nodelay(true)?;
        tracing::debug!(upstream = %target.authority(), "RTSP control connected");
        Ok(Self::new(stream))
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.reader.get_ref().peer_addr()?)
    }
}

impl<S: Read + Write> RtspClient<S> {
    pub fn new(stream: S) -> Self {
        Self {
            reader: MessageReader::new(stream, SESSION_MESSAGE_LIMIT),
            cseq: 0,
            session_id: None,
        }
    }

    /// CSeq of the most recent request (0 before the first).
    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Remember the id from a `Session` header value, dropping any
    /// `;timeout=` suffix.
    pub fn set_session_id(&mut self, header: &str) {
        let id = header.split(';').next().unwrap_or(header).trim();
        self.session_id = Some(id.to_string());
    }

    /// Send `request` and return its successful response.
    pub fn send(&mut self, mut request: RtspRequest) -> Result<RtspResponse> {
        self.cseq += 1;
        request.headers.set("CSeq", &self.cseq.to_string());
        if let Some(id) = &self.session_id {
            request.headers.set("Session", id);
        }

        tracing::debug!(method = %request.method, uri = %request.uri, cseq = self.cseq, "request");

        let stream = self.reader.get_mut();
        stream.write_all(&request.serialize())?;
        stream.flush()?;

        let raw = self
            .reader
            .read_message()?
            .ok_or(RtspError::parse(ParseErrorKind::Truncated))?;
        let response = RtspResponse::parse(&raw)?;

        tracing::debug!(
            method = %request.method,
            status = response.status_code,
            reason = %response.status_text,
            "response"
        );

        response.require_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// In-memory stream: canned responses in, requests captured out.
    struct Scripted {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Scripted {
        fn new(responses: &[&str]) -> Self {
            Self {
                input: Cursor::new(responses.concat().into_bytes()),
                output: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sent_requests(client: &RtspClient<Scripted>) -> Vec<RtspRequest> {
        let mut reader = MessageReader::new(
            Cursor::new(client.reader.get_ref().output.clone()),
            SESSION_MESSAGE_LIMIT,
        );
        let mut requests = Vec::new();
        while let Some(raw) = reader.read_message().unwrap() {
            requests.push(RtspRequest::parse(&raw).unwrap());
        }
        requests
    }

    #[test]
    fn cseq_increments_by_one_and_session_is_echoed() {
        let mut client = RtspClient::new(Scripted::new(&[
            "RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\n",
            "RTSP/1.0 200 OK\r\nCSeq: 2\r\nSession: 1234ABCD;timeout=60\r\n\r\n",
            "RTSP/1.0 200 OK\r\nCSeq: 3\r\n\r\n",
        ]));

        client
            .send(RtspRequest::new("OPTIONS", "rtsp://h:554/s"))
            .unwrap();
        let setup = client
            .send(RtspRequest::new("SETUP", "rtsp://h:554/s"))
            .unwrap();
        client.set_session_id(setup.headers.get("Session").unwrap());
        client
            .send(RtspRequest::new("PLAY", "rtsp://h:554/s"))
            .unwrap();

        assert_eq!(client.cseq(), 3);
        assert_eq!(client.session_id(), Some("1234ABCD"));

        let sent = sent_requests(&client);
        let cseqs: Vec<_> = sent.iter().map(|r| r.headers.get("CSeq").unwrap()).collect();
        assert_eq!(cseqs, ["1", "2", "3"]);
        assert_eq!(sent[0].headers.get("Session"), None);
        assert_eq!(sent[1].headers.get("Session"), None);
        assert_eq!(sent[2].headers.get("Session"), Some("1234ABCD"));
    }

    #[test]
    fn error_status_fails_the_request() {
        let mut client = RtspClient::new(Scripted::new(&["RTSP/1.0 404 Not Found\r\nCSeq: 1\r\n\r\n"]));
        assert!(matches!(
            client.send(RtspRequest::new("DESCRIBE", "rtsp://h:554/missing")),
            Err(RtspError::Status(404))
        ));
    }

    #[test]
    fn garbage_or_closed_connection_fails() {
        let mut client = RtspClient::new(Scripted::new(&["HTTP/1.0 200 OK\r\n\r\n"]));
        assert!(matches!(
            client.send(RtspRequest::new("OPTIONS", "rtsp://h:554/s")),
            Err(RtspError::Parse { .. })
        ));

        let mut closed = RtspClient::new(Scripted::new(&[]));
        assert!(closed.send(RtspRequest::new("OPTIONS", "rtsp://h:554/s")).is_err());
    }

    #[test]
    fn describe_body_does_not_leak_into_next_response() {
        let mut client = RtspClient::new(Scripted::new(&[
            "RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Length: 10\r\n\r\nv=0\r\ns=x\r\n",
            "RTSP/1.0 200 OK\r\nCSeq: 2\r\nSession: 77\r\n\r\n",
        ]));
        let describe = client
            .send(RtspRequest::new("DESCRIBE", "rtsp://h:554/s"))
            .unwrap();
        assert_eq!(describe.body, b"v=0\r\ns=x\r\n");
        let setup = client
            .send(RtspRequest::new("SETUP", "rtsp://h:554/s"))
            .unwrap();
        assert_eq!(setup.headers.get("Session"), Some("77"));
    }
}
