use crate::error::{Result, RtpErrorKind, RtspError};

/// Size of the RTP fixed header (RFC 3550 §5.1).
pub const RTP_HEADER_LEN: usize = 12;

/// Dynamic payload type used for the upstream trigger datagram.
pub const TRIGGER_PAYLOAD_TYPE: u8 = 96;

/// RTP fixed header builder (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The gateway only ever sends header-only packets (the NAT trigger), so the
/// timestamp stays at zero. Padding, extension, and CSRC count are always 0.
#[derive(Debug)]
pub struct RtpHeader {
    /// RTP payload type (7-bit, RFC 3551).
    pub pt: u8,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    sequence: u16,
}

impl RtpHeader {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self {
            pt,
            ssrc,
            sequence: 0,
        }
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8) -> Self {
        let ssrc = rand::random::<u32>();
        Self::new(pt, ssrc)
    }

    /// Serialize a 12-byte header and advance the sequence number.
    pub fn write(&mut self, marker: bool) -> [u8; RTP_HEADER_LEN] {
        let first_byte: u8 = 2 << 6;
        let second_byte: u8 = ((marker as u8) << 7) | (self.pt & 0x7f);

        let mut header = [0u8; RTP_HEADER_LEN];
        header[0] = first_byte;
        header[1] = second_byte;
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        self.sequence = self.sequence.wrapping_add(1);
        header
    }
}

/// A decoded datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datagram<'a> {
    /// A well-formed RTP packet, reduced to its media payload.
    Rtp { payload: &'a [u8], sequence: u16 },
    /// Not RTP (too short or version bits are not `10`); the whole
    /// datagram, untouched.
    Opaque(&'a [u8]),
}

impl<'a> Datagram<'a> {
    /// Classify one received datagram and locate its payload.
    ///
    /// Payload start is `12 + 4 * CC`, plus `4 + 4 * words` when the X bit is
    /// set. With the P bit set, the final byte counts trailing padding.
    /// Inconsistent headers are reported as
    /// [`RtspError::MalformedRtp`], distinct from `Opaque`.
    pub fn decode(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < RTP_HEADER_LEN || buf[0] & 0xc0 != 0x80 {
            return Ok(Datagram::Opaque(buf));
        }

        let flags = buf[0];
        let sequence = u16::from_be_bytes([buf[2], buf[3]]);
        let mut start = RTP_HEADER_LEN + usize::from(flags & 0x0f) * 4;

        if flags & 0x10 != 0 {
            let ext = buf
                .get(start..start + 4)
                .ok_or(malformed(RtpErrorKind::TruncatedExtension))?;
            let words = usize::from(u16::from_be_bytes([ext[2], ext[3]]));
            start += 4 + 4 * words;
            if start > buf.len() {
                return Err(malformed(RtpErrorKind::TruncatedExtension));
            }
        }

        let mut length = buf.len() as isize - start as isize;
        if flags & 0x20 != 0 {
            length -= isize::from(buf[buf.len() - 1]);
        }

        if length <= 0 || start + length as usize > buf.len() {
            return Err(malformed(RtpErrorKind::InvalidPayloadLength));
        }

        Ok(Datagram::Rtp {
            payload: &buf[start..start + length as usize],
            sequence,
        })
    }
}

fn malformed(kind: RtpErrorKind) -> RtspError {
    RtspError::MalformedRtp { kind }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(first: u8, extra_header: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![first, 96, 0x12, 0x34, 0, 0, 0, 1, 0xaa, 0xbb, 0xcc, 0xdd];
        buf.extend_from_slice(extra_header);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn header_version_and_ssrc() {
        let mut h = RtpHeader::new(TRIGGER_PAYLOAD_TYPE, 0xAABBCCDD);
        let buf = h.write(false);
        assert_eq!(buf[0] >> 6, 2);
        assert_eq!(buf[1] & 0x7f, 96);
        assert_eq!(&buf[8..12], &[0xAA, 0xBB, 0xCC, 0xDD]);
        let next = h.write(true);
        assert_eq!(u16::from_be_bytes([next[2], next[3]]), 1);
        assert_eq!(next[1] & 0x80, 0x80);
    }

    #[test]
    fn plain_packet_payload_starts_after_fixed_header() {
        let buf = packet(0x80, &[], b"hello");
        match Datagram::decode(&buf).unwrap() {
            Datagram::Rtp { payload, sequence } => {
                assert_eq!(payload, b"hello");
                assert_eq!(sequence, 0x1234);
            }
            other => panic!("expected RTP, got {other:?}"),
        }
    }

    #[test]
    fn csrc_entries_are_skipped() {
        for count in 0..4u8 {
            let csrcs = vec![0x11; usize::from(count) * 4];
            let buf = packet(0x80 | count, &csrcs, b"xyz");
            let Datagram::Rtp { payload, .. } = Datagram::decode(&buf).unwrap() else {
                panic!("expected RTP");
            };
            assert_eq!(payload.len(), buf.len() - (12 + 4 * usize::from(count)));
            assert_eq!(payload, b"xyz");
        }
    }

    #[test]
    fn extension_is_skipped() {
        // profile 0xBEDE, one 32-bit word of extension data
        let ext = [0xBE, 0xDE, 0x00, 0x01, 1, 2, 3, 4];
        let buf = packet(0x90, &ext, b"media");
        let Datagram::Rtp { payload, .. } = Datagram::decode(&buf).unwrap() else {
            panic!("expected RTP");
        };
        assert_eq!(payload, b"media");
    }

    #[test]
    fn extension_past_end_is_malformed() {
        let ext = [0xBE, 0xDE, 0x00, 0x09, 1, 2, 3, 4];
        let buf = packet(0x90, &ext, b"ab");
        assert!(matches!(
            Datagram::decode(&buf),
            Err(RtspError::MalformedRtp {
                kind: RtpErrorKind::TruncatedExtension
            })
        ));

        let buf = packet(0x90, &[0xBE, 0xDE], &[]);
        assert!(Datagram::decode(&buf).is_err());
    }

    #[test]
    fn padding_is_removed() {
        let buf = packet(0xA0, &[], &[9, 9, 9, 0, 0, 3]);
        let Datagram::Rtp { payload, .. } = Datagram::decode(&buf).unwrap() else {
            panic!("expected RTP");
        };
        assert_eq!(payload, &[9, 9, 9]);
    }

    #[test]
    fn empty_payload_is_malformed() {
        let buf = packet(0x80, &[], &[]);
        assert!(Datagram::decode(&buf).is_err());

        let padded_away = packet(0xA0, &[], &[0, 2]);
        assert!(Datagram::decode(&padded_away).is_err());

        let too_many_csrcs = packet(0x8F, &[], &[1, 2, 3, 4]);
        assert!(Datagram::decode(&too_many_csrcs).is_err());
    }

    #[test]
    fn non_rtp_is_opaque() {
        let short = [0x80u8; 8];
        assert_eq!(Datagram::decode(&short).unwrap(), Datagram::Opaque(&short));

        let wrong_version = packet(0x40, &[], b"data");
        assert_eq!(
            Datagram::decode(&wrong_version).unwrap(),
            Datagram::Opaque(&wrong_version)
        );
    }
}
