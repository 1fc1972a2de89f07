//! Integration test: RTSP client → proxy → fake upstream, with the RTP
//! relayed back to the client's originally requested port.

mod common;

use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, TcpStream, UdpSocket};
use std::time::Duration;

use rtspunch::protocol::{RtspRequest, RtspResponse};
use rtspunch::session::{PortPair, TransportHeader};
use rtspunch::transport::MessageReader;
use rtspunch::{Role, Server, ServerConfig};

use common::{SESSION_ID, Upstream, payload};

const PORT_MIN: u16 = 41000;
const PORT_MAX: u16 = 41998;

struct Client {
    reader: MessageReader<TcpStream>,
    cseq: u32,
}

impl Client {
    fn connect(server: &Server) -> Self {
        let addr = server.local_addr().unwrap();
        let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2)).expect("connect to proxy");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        Self {
            reader: MessageReader::new(stream, 4096),
            cseq: 0,
        }
    }

    fn send(&mut self, request: RtspRequest) -> RtspResponse {
        self.cseq += 1;
        let request = request.header("CSeq", &self.cseq.to_string());
        self.reader.get_mut().write_all(&request.serialize()).unwrap();
        let raw = self.reader.read_message().unwrap().expect("proxy response");
        RtspResponse::parse(&raw).unwrap()
    }
}

#[test]
fn setup_is_rewritten_and_rtp_is_relayed_to_original_port() {
    let upstream = Upstream::spawn();
    let config = ServerConfig {
        bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        stun_server: None,
        proxy_port_range: (PORT_MIN, PORT_MAX),
        ..ServerConfig::default()
    };
    let mut server = Server::with_config(Role::Proxy, config);
    server.start().expect("proxy start");

    let rtp_in = UdpSocket::bind("127.0.0.1:0").unwrap();
    rtp_in
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let client_rtp = rtp_in.local_addr().unwrap().port();

    let proxy = server.local_addr().unwrap();
    let url = format!("rtsp://{proxy}/rtp/{}/stream1", upstream.addr);
    let mut client = Client::connect(&server);

    assert!(client.send(RtspRequest::new("OPTIONS", &url)).is_success());
    let describe = client.send(RtspRequest::new("DESCRIBE", &url).header("Accept", "application/sdp"));
    assert!(describe.is_success());
    assert!(describe.body.starts_with(b"v=0"));

    let setup = client.send(RtspRequest::new("SETUP", &url).header(
        "Transport",
        &format!("RTP/AVP/UDP;unicast;client_port={client_rtp}-{}", client_rtp + 1),
    ));
    assert!(setup.is_success());
    let session = setup.headers.get("Session").unwrap().split(';').next().unwrap().to_string();
    let answered = TransportHeader::parse(setup.headers.get("Transport").unwrap());
    assert_eq!(
        answered.server_port,
        Some(PortPair::starting_at(upstream.media_port))
    );

    let play = client.send(RtspRequest::new("PLAY", &url).header("Session", &session));
    assert!(play.is_success());

    let mut buf = [0u8; 2048];
    let (len, from) = rtp_in.recv_from(&mut buf).expect("relayed RTP");
    assert_eq!(from.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert!((PORT_MIN..=PORT_MAX).contains(&from.port()));
    assert_eq!(len, 12 + payload(0).len());
    assert_eq!(&buf[12..len], payload(0).as_slice(), "relay forwards whole datagrams");

    let teardown = client.send(RtspRequest::new("TEARDOWN", &url).header("Session", &session));
    assert!(teardown.is_success());
    drop(client);

    let upstream_addr = upstream.addr;
    let seen = upstream.join();
    let methods: Vec<_> = seen.iter().map(|r| r.method.as_str()).collect();
    assert_eq!(methods, ["OPTIONS", "DESCRIBE", "SETUP", "PLAY", "TEARDOWN"]);

    let upstream_url = format!("rtsp://{}/stream1", upstream_addr);
    for request in &seen {
        assert_eq!(request.uri, upstream_url);
    }
    assert_eq!(seen[3].headers.get("Session"), Some(SESSION_ID));

    let rewritten = TransportHeader::parse(seen[2].headers.get("Transport").unwrap());
    let local = rewritten.client_port.unwrap();
    assert_ne!(local.rtp, client_rtp);
    assert!((PORT_MIN..=PORT_MAX).contains(&local.rtp));
    assert_eq!(local.rtp % 2, 0);
    assert_eq!(local.rtcp, local.rtp + 1);
    assert_eq!(from.port(), local.rtp, "relay sends from the advertised port");

    server.stop();
    server.wait().unwrap();
}

#[test]
fn first_request_without_upstream_closes_connection() {
    let config = ServerConfig {
        bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        stun_server: None,
        proxy_port_range: (PORT_MIN + 1000, PORT_MAX + 1000),
        ..ServerConfig::default()
    };
    let mut server = Server::with_config(Role::Proxy, config);
    server.start().expect("proxy start");

    let mut client = Client::connect(&server);
    client
        .reader
        .get_mut()
        .write_all(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n")
        .unwrap();
    assert!(matches!(client.reader.read_message(), Ok(None)));

    server.stop();
    server.wait().unwrap();
}
