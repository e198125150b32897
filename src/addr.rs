//! Compact peer address records (§4.1): a concatenated sequence of 6-byte
//! entries, each four address octets followed by a big-endian port.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::error::{Error, Result};

const COMPACT_PEER_LEN: usize = 6;

/// Parses a compact peer blob into routable socket addresses, in input
/// order.
///
/// Fails with [`Error::Malformed`] if the blob's length is not a multiple
/// of 6.
pub fn parse_compact_peers(buf: &[u8]) -> Result<Vec<SocketAddr>> {
    if buf.len() % COMPACT_PEER_LEN != 0 {
        return Err(Error::Malformed(
            "compact peer blob length is not a multiple of 6",
        ));
    }

    Ok(buf
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddr::V4(SocketAddrV4::new(ip, port))
        })
        .collect())
}

/// Serializes socket addresses back into their compact 6-byte-per-peer
/// form, in input order. Non-IPv4 addresses are skipped, as the compact
/// format has no IPv6 representation.
pub fn marshal_compact_peers(addrs: &[SocketAddr]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(addrs.len() * COMPACT_PEER_LEN);
    for addr in addrs {
        if let SocketAddr::V4(addr) = addr {
            buf.extend_from_slice(&addr.ip().octets());
            buf.extend_from_slice(&addr.port().to_be_bytes());
        }
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_peer() {
        let buf = [127, 0, 0, 1, 0x1A, 0xE1];
        let peers = parse_compact_peers(&buf).unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].to_string(), "127.0.0.1:6881");
    }

    #[test]
    fn parses_multiple_peers_in_order() {
        let buf = [
            10, 0, 0, 1, 0x00, 0x50, // 10.0.0.1:80
            192, 168, 1, 1, 0x1F, 0x90, // 192.168.1.1:8080
        ];
        let peers = parse_compact_peers(&buf).unwrap();
        assert_eq!(peers[0].to_string(), "10.0.0.1:80");
        assert_eq!(peers[1].to_string(), "192.168.1.1:8080");
    }

    #[test]
    fn empty_blob_yields_no_peers() {
        assert_eq!(parse_compact_peers(&[]).unwrap(), Vec::new());
    }

    #[test]
    fn rejects_length_not_multiple_of_six() {
        let buf = [1, 2, 3, 4, 5];
        assert!(matches!(
            parse_compact_peers(&buf),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn round_trips_through_marshal() {
        let buf = [
            127, 0, 0, 1, 0x1A, 0xE1, 8, 8, 8, 8, 0x00, 0x35,
        ];
        let peers = parse_compact_peers(&buf).unwrap();
        let remarshaled = marshal_compact_peers(&peers);
        assert_eq!(remarshaled, buf.to_vec());
    }
}
