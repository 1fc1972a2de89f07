use std::fmt;

/// An RTP/RTCP UDP port pair, conventionally `rtp` even and `rtcp = rtp + 1`
/// (RFC 3550 §11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    pub rtp: u16,
    pub rtcp: u16,
}

impl PortPair {
    /// The pair starting at `rtp`.
    pub fn starting_at(rtp: u16) -> Self {
        Self {
            rtp,
            rtcp: rtp.wrapping_add(1),
        }
    }

    /// Parse `RTP-RTCP`, or a lone `RTP` meaning `RTP-(RTP+1)`.
    fn parse(value: &str) -> Option<Self> {
        match value.split_once('-') {
            Some((rtp, rtcp)) => Some(Self {
                rtp: rtp.trim().parse().ok()?,
                rtcp: rtcp.trim().parse().ok()?,
            }),
            None => Some(Self::starting_at(value.trim().parse().ok()?)),
        }
    }
}

impl fmt::Display for PortPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.rtp, self.rtcp)
    }
}

/// The port parameters of an RTSP `Transport` header (RFC 2326 §12.39).
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP/UDP;unicast;client_port=8000-8001
///
/// Server → Client:
///   Transport: RTP/AVP/UDP;unicast;client_port=8000-8001;server_port=6970-6971
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportHeader {
    pub client_port: Option<PortPair>,
    pub server_port: Option<PortPair>,
}

impl TransportHeader {
    /// Extract `client_port=` and `server_port=` from the header value.
    ///
    /// Unknown or unparsable parameters are ignored.
    ///
    /// ```
    /// use rtspunch::session::transport::{PortPair, TransportHeader};
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001;server_port=6970-6971");
    /// assert_eq!(th.client_port, Some(PortPair { rtp: 8000, rtcp: 8001 }));
    /// assert_eq!(th.server_port, Some(PortPair { rtp: 6970, rtcp: 6971 }));
    ///
    /// assert_eq!(TransportHeader::parse("RTP/AVP;unicast").client_port, None);
    /// ```
    pub fn parse(header: &str) -> Self {
        let mut parsed = TransportHeader::default();
        for part in header.split(';') {
            let part = part.trim();
            if let Some(ports) = part.strip_prefix("client_port=") {
                parsed.client_port = PortPair::parse(ports);
            } else if let Some(ports) = part.strip_prefix("server_port=") {
                parsed.server_port = PortPair::parse(ports);
            }
        }
        parsed
    }

    /// The `Transport` value the session engine offers in SETUP.
    pub fn unicast_request(client_port: PortPair) -> String {
        format!("RTP/AVP/UDP;unicast;client_port={client_port}")
    }
}

/// Replace the `client_port=` parameter of a `Transport` value with `pair`,
/// leaving every other parameter as it was. A value without `client_port`
/// gets one appended.
pub fn rewrite_client_port(header: &str, pair: PortPair) -> String {
    let replacement = format!("client_port={pair}");
    let mut found = false;

    let mut parts: Vec<String> = header
        .split(';')
        .map(|part| {
            if part.trim().starts_with("client_port=") {
                found = true;
                replacement.clone()
            } else {
                part.to_string()
            }
        })
        .collect();

    if !found {
        parts.push(replacement);
    }
    parts.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_client_and_server_ports() {
        let th = TransportHeader::parse(
            "RTP/AVP/UDP;unicast;client_port=5000-5001;server_port=6970-6971;ssrc=1A2B3C4D",
        );
        assert_eq!(th.client_port, Some(PortPair { rtp: 5000, rtcp: 5001 }));
        assert_eq!(th.server_port, Some(PortPair { rtp: 6970, rtcp: 6971 }));
    }

    #[test]
    fn single_port_implies_rtcp_next() {
        let th = TransportHeader::parse("RTP/AVP;unicast;server_port=7000");
        assert_eq!(th.server_port, Some(PortPair { rtp: 7000, rtcp: 7001 }));
    }

    #[test]
    fn parse_no_ports() {
        assert_eq!(
            TransportHeader::parse("RTP/AVP;unicast"),
            TransportHeader::default()
        );
        assert_eq!(TransportHeader::parse("client_port=x-y").client_port, None);
    }

    #[test]
    fn unicast_request_format() {
        assert_eq!(
            TransportHeader::unicast_request(PortPair::starting_at(30010)),
            "RTP/AVP/UDP;unicast;client_port=30010-30011"
        );
    }

    #[test]
    fn rewrite_only_touches_client_port() {
        let rewritten = rewrite_client_port(
            "RTP/AVP/UDP;unicast;client_port=5000-5001;mode=play",
            PortPair::starting_at(30010),
        );
        assert_eq!(rewritten, "RTP/AVP/UDP;unicast;client_port=30010-30011;mode=play");
    }

    #[test]
    fn rewrite_appends_when_missing() {
        let rewritten = rewrite_client_port("RTP/AVP;unicast", PortPair::starting_at(40000));
        assert_eq!(rewritten, "RTP/AVP;unicast;client_port=40000-40001");
    }
}
