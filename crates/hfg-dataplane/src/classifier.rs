//! Per-packet fast/slow classification.
//!
//! Pure function over a borrowed L2 frame. Trading-venue TCP flows (the
//! fixed port set below) take the fast path; everything else — ARP, ICMP,
//! SSH, UDP, malformed frames — is slow-path so the host kernel stays fully
//! reachable. Truncated headers are never dropped silently for the same
//! reason: kernel diagnostic flows must remain visible.

/// Venue-facing TCP ports: OKX (8443) and Bybit (443). Fixed for this
/// release.
pub const FAST_TCP_PORTS: [u16; 2] = [8443, 443];

const ETHER_TYPE_IPV4: u16 = 0x0800;
const ETH_HDR_LEN: usize = 14;
const IPV4_MIN_HDR_LEN: usize = 20;
const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;

/// Classification verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Venue traffic: duplicated into the HFT ring and forwarded to the
    /// kernel.
    Fast,
    /// Everything else: forwarded to the kernel only.
    Slow,
    /// Reserved for explicit filters; the port-set classifier never emits it.
    Drop,
}

#[inline]
fn be16(frame: &[u8], offset: usize) -> Option<u16> {
    let bytes = frame.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Classify one L2 frame.
///
/// Rules, in order: non-IPv4 → slow; IPv4/UDP → slow; IPv4/TCP with source
/// or destination port in [`FAST_TCP_PORTS`] → fast; otherwise slow. Any
/// header-bounds failure → slow.
pub fn classify(frame: &[u8]) -> Verdict {
    let Some(ether_type) = be16(frame, 12) else {
        return Verdict::Slow;
    };
    if ether_type != ETHER_TYPE_IPV4 {
        return Verdict::Slow;
    }

    if frame.len() < ETH_HDR_LEN + IPV4_MIN_HDR_LEN {
        return Verdict::Slow;
    }
    let version_ihl = frame[ETH_HDR_LEN];
    let ihl = ((version_ihl & 0x0f) as usize) * 4;
    if ihl < IPV4_MIN_HDR_LEN {
        return Verdict::Slow;
    }
    let proto = frame[ETH_HDR_LEN + 9];

    if proto == IPPROTO_UDP {
        // All venue market data rides TCP (WebSocket); UDP is host traffic.
        return Verdict::Slow;
    }
    if proto != IPPROTO_TCP {
        return Verdict::Slow;
    }

    let tcp_off = ETH_HDR_LEN + ihl;
    let (Some(src_port), Some(dst_port)) = (be16(frame, tcp_off), be16(frame, tcp_off + 2)) else {
        return Verdict::Slow;
    };

    if FAST_TCP_PORTS.contains(&src_port) || FAST_TCP_PORTS.contains(&dst_port) {
        return Verdict::Fast;
    }
    Verdict::Slow
}


#[cfg(test)]
mod tests {
    use super::test_frames::*;
    use super::*;

    #[test]
    fn venue_dst_port_is_fast() {
        let frame = ipv4_frame(IPPROTO_TCP, 5, 55000, 8443, 100);
        assert_eq!(classify(&frame), Verdict::Fast);
    }

    #[test]
    fn venue_src_port_is_fast() {
        // Inbound market data: venue is the source.
        let frame = ipv4_frame(IPPROTO_TCP, 5, 443, 55000, 100);
        assert_eq!(classify(&frame), Verdict::Fast);
    }

    #[test]
    fn other_tcp_is_slow() {
        let frame = ipv4_frame(IPPROTO_TCP, 5, 55000, 22, 0);
        assert_eq!(classify(&frame), Verdict::Slow);
    }

    #[test]
    fn udp_is_slow() {
        let frame = ipv4_frame(IPPROTO_UDP, 5, 0, 0, 32);
        assert_eq!(classify(&frame), Verdict::Slow);
    }

    #[test]
    fn icmp_is_slow() {
        let frame = ipv4_frame(1, 5, 0, 0, 64);
        assert_eq!(classify(&frame), Verdict::Slow);
    }

    #[test]
    fn arp_is_slow() {
        assert_eq!(classify(&arp_frame()), Verdict::Slow);
    }

    #[test]
    fn ip_options_shift_tcp_header() {
        // IHL 8 words = 12 bytes of options before the TCP header.
        let frame = ipv4_frame(IPPROTO_TCP, 8, 443, 55000, 0);
        assert_eq!(classify(&frame), Verdict::Fast);
    }

    #[test]
    fn truncated_frames_are_slow() {
        assert_eq!(classify(&[]), Verdict::Slow);
        assert_eq!(classify(&[0u8; 13]), Verdict::Slow);
        // IPv4 EtherType but no IP header.
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        assert_eq!(classify(&frame), Verdict::Slow);
        // TCP proto but header cut off before the ports.
        let full = ipv4_frame(IPPROTO_TCP, 5, 443, 55000, 0);
        assert_eq!(classify(&full[..36]), Verdict::Slow);
    }

    #[test]
    fn bogus_ihl_is_slow() {
        let mut frame = ipv4_frame(IPPROTO_TCP, 5, 443, 55000, 0);
        frame[14] = 0x42; // IHL 2 words: below the IPv4 minimum
        assert_eq!(classify(&frame), Verdict::Slow);
    }
}
