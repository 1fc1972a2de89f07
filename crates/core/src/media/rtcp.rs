/// RTCP packet type for a Receiver Report (RFC 3550 §6.4.2).
pub const RTCP_RR: u8 = 201;

/// Build an empty Receiver Report (no report blocks) for `ssrc`.
///
/// ```text
/// |V=2|P|  RC=0   |   PT=201      |          length=1             |
/// |                     SSRC of packet sender                     |
/// ```
pub fn receiver_report(ssrc: u32) -> [u8; 8] {
    let mut packet = [0u8; 8];
    packet[0] = 2 << 6;
    packet[1] = RTCP_RR;
    packet[2..4].copy_from_slice(&1u16.to_be_bytes());
    packet[4..8].copy_from_slice(&ssrc.to_be_bytes());
    packet
}
