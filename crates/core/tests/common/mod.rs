//! Fake upstream RTSP source shared by the integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rtspunch::media::RtpHeader;
use rtspunch::protocol::{RtspRequest, RtspResponse};
use rtspunch::session::TransportHeader;
use rtspunch::transport::MessageReader;

pub const SESSION_ID: &str = "SESS42";

/// Payload carried by the `index`-th media packet.
pub fn payload(index: usize) -> Vec<u8> {
    format!("pkt-{index:03}").into_bytes()
}

/// One-connection RTSP server that answers the usual client sequence and,
/// after PLAY, streams RTP to the negotiated `client_port` on loopback
/// until TEARDOWN or disconnect.
pub struct Upstream {
    pub addr: SocketAddr,
    pub media_port: u16,
    handle: JoinHandle<Vec<RtspRequest>>,
}

impl Upstream {
    pub fn spawn() -> Self {
        Self::spawn_refusing(None)
    }

    /// Like [`spawn`](Self::spawn), but answer `method` with 404.
    pub fn spawn_refusing(refuse: Option<&'static str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let media = UdpSocket::bind("127.0.0.1:0").unwrap();
        let media_port = media.local_addr().unwrap().port();

        let handle = thread::spawn(move || serve(listener, media, refuse));
        Self {
            addr,
            media_port,
            handle,
        }
    }

    /// Wait for the control connection to end and return every request seen.
    pub fn join(self) -> Vec<RtspRequest> {
        self.handle.join().unwrap()
    }
}

fn serve(listener: TcpListener, media: UdpSocket, refuse: Option<&'static str>) -> Vec<RtspRequest> {
    let (stream, _) = listener.accept().unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(15)))
        .unwrap();
    let media_port = media.local_addr().unwrap().port();
    let mut reader = MessageReader::new(stream, 8192);

    let streaming = Arc::new(AtomicBool::new(true));
    let mut sender = None;
    let mut client_rtp = None;
    let mut seen = Vec::new();

    while let Ok(Some(raw)) = reader.read_message() {
        let request = RtspRequest::parse(&raw).unwrap();
        let cseq = request.headers.get("CSeq").unwrap_or("0").to_string();

        let mut response = if refuse == Some(request.method.as_str()) {
            RtspResponse::new(404, "Not Found")
        } else {
            RtspResponse::ok()
        }
        .add_header("CSeq", &cseq);

        let refused = response.status_code != 200;
        let mut done = refused;
        match request.method.as_str() {
            _ if refused => {}
            "OPTIONS" => {
                response = response.add_header("Public", "OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN, GET_PARAMETER");
            }
            "DESCRIBE" => {
                response = response
                    .add_header("Content-Base", &format!("{}/", request.uri))
                    .add_header("Content-Type", "application/sdp")
                    .with_body("v=0\r\ns=fake\r\nm=video 0 RTP/AVP 33\r\n");
            }
            "SETUP" => {
                let transport = request.headers.get("Transport").unwrap_or_default();
                client_rtp = TransportHeader::parse(transport).client_port.map(|p| p.rtp);
                response = response
                    .add_header("Session", &format!("{SESSION_ID};timeout=60"))
                    .add_header(
                        "Transport",
                        &format!("{transport};server_port={}-{}", media_port, media_port + 1),
                    );
            }
            "PLAY" => {
                if let Some(port) = client_rtp {
                    let media = media.try_clone().unwrap();
                    let streaming = streaming.clone();
                    sender = Some(thread::spawn(move || stream_media(media, port, &streaming)));
                }
            }
            "TEARDOWN" => done = true,
            _ => {}
        }

        reader.get_mut().write_all(&response.serialize()).unwrap();
        seen.push(request);
        if done {
            break;
        }
    }

    streaming.store(false, Ordering::SeqCst);
    if let Some(sender) = sender {
        sender.join().unwrap();
    }
    seen
}

fn stream_media(media: UdpSocket, port: u16, streaming: &AtomicBool) {
    let to = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let mut header = RtpHeader::new(33, 0x5eed);
    for index in 0..1000 {
        if !streaming.load(Ordering::SeqCst) {
            break;
        }
        let mut packet = header.write(false).to_vec();
        packet.extend_from_slice(&payload(index));
        let _ = media.send_to(&packet, to);
        thread::sleep(Duration::from_millis(20));
    }
}
