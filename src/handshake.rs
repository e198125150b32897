//! The fixed-layout 68-byte handshake (§4.3):
//!
//! ```text
//! [1]  pstrlen = 19
//! [19] pstr    = "BitTorrent protocol"
//! [8]  reserved (all zero on send; ignored on receive)
//! [20] info_hash
//! [20] peer_id
//! ```

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Error, HandshakeError};

/// The protocol name all conforming peers send.
pub const PROTOCOL_STRING: &str = "BitTorrent protocol";

const RESERVED_LEN: usize = 8;
const HASH_LEN: usize = 20;

/// One side's opening handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handshake {
    /// The protocol name the remote announced (normally
    /// [`PROTOCOL_STRING`], but not rejected if it differs, only if empty).
    pub protocol: Vec<u8>,
    /// The 20-byte info hash identifying the torrent.
    pub info_hash: [u8; 20],
    /// The remote's 20-byte peer id.
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Builds a handshake using the canonical [`PROTOCOL_STRING`].
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            protocol: PROTOCOL_STRING.as_bytes().to_vec(),
            info_hash,
            peer_id,
        }
    }

    /// Serializes this handshake to exactly `1 + protocol.len() + 8 + 20 +
    /// 20` bytes (68 for the canonical protocol string).
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.protocol.len() + RESERVED_LEN + 2 * HASH_LEN);
        buf.push(self.protocol.len() as u8);
        buf.extend_from_slice(&self.protocol);
        buf.extend_from_slice(&[0u8; RESERVED_LEN]);
        buf.extend_from_slice(&self.info_hash);
        buf.extend_from_slice(&self.peer_id);
        buf
    }
}

/// Frames the handshake exchange over a `tokio_util::codec::Framed` socket.
///
/// Used only for the first 68(+) bytes of a connection; the socket is then
/// switched to [`crate::message::codec::MessageCodec`], reusing the
/// framing buffers.
pub struct HandshakeCodec;

impl Decoder for HandshakeCodec {
    type Item = Handshake;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let pstr_len = src[0] as usize;
        if pstr_len == 0 {
            return Err(HandshakeError::EmptyProtocolString.into());
        }

        let total_len = 1 + pstr_len + RESERVED_LEN + 2 * HASH_LEN;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let mut src = src.split_to(total_len);
        src.advance(1); // pstrlen
        let protocol = src.split_to(pstr_len).to_vec();
        src.advance(RESERVED_LEN);

        let mut info_hash = [0u8; HASH_LEN];
        src.copy_to_slice(&mut info_hash);
        let mut peer_id = [0u8; HASH_LEN];
        src.copy_to_slice(&mut peer_id);

        Ok(Some(Handshake {
            protocol,
            info_hash,
            peer_id,
        }))
    }
}

impl Encoder<Handshake> for HandshakeCodec {
    type Error = Error;

    fn encode(&mut self, item: Handshake, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(1 + item.protocol.len() + RESERVED_LEN + 2 * HASH_LEN);
        dst.put_u8(item.protocol.len() as u8);
        dst.put_slice(&item.protocol);
        dst.put_slice(&[0u8; RESERVED_LEN]);
        dst.put_slice(&item.info_hash);
        dst.put_slice(&item.peer_id);
        Ok(())
    }
}
