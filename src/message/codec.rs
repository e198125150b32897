use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{Message, MessageId};
use crate::{bitfield::Bitfield, error::{Error, ProtocolError}};

const LEN_PREFIX_LEN: usize = 4;

/// Codec for the steady-state peer wire protocol (everything after the
/// handshake). Frames are `[u32 length][u8 id][payload]`; a zero-length
/// frame is a keep-alive and decodes to `Message::KeepAlive`.
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LEN_PREFIX_LEN {
            return Ok(None);
        }

        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if src.len() < LEN_PREFIX_LEN + len {
            src.reserve(LEN_PREFIX_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX_LEN);

        if len == 0 {
            return Ok(Some(Message::KeepAlive));
        }

        let mut frame = src.split_to(len);
        let id = frame.get_u8();

        let msg = match MessageId::from_u8(id) {
            Some(MessageId::Choke) => Message::Choke,
            Some(MessageId::Unchoke) => Message::Unchoke,
            Some(MessageId::Interested) => Message::Interested,
            Some(MessageId::NotInterested) => Message::NotInterested,
            Some(MessageId::Have) => {
                // A malformed Have (wrong payload length) is a non-fatal
                // no-op per the wire spec: report index 0 rather than
                // drop the session.
                let piece_index = if frame.len() == 4 { frame.get_u32() } else { 0 };
                Message::Have { piece_index }
            }
            Some(MessageId::Bitfield) => Message::Bitfield(Bitfield::from_bytes(frame.to_vec())),
            Some(MessageId::Request) => {
                let (index, begin, length) = read_triple_lenient(&mut frame);
                Message::Request { index, begin, length }
            }
            Some(MessageId::Cancel) => {
                let (index, begin, length) = read_triple_lenient(&mut frame);
                Message::Cancel { index, begin, length }
            }
            Some(MessageId::Piece) => {
                if frame.len() < 8 {
                    return Err(ProtocolError::PiecePayloadTooShort.into());
                }
                let index = frame.get_u32();
                let begin = frame.get_u32();
                let block = frame.to_vec();
                Message::Piece { index, begin, block }
            }
            None => {
                // Unknown ids are ignored by the piece state machine's
                // dispatcher; we still need a representation to hand it
                // a no-op, so fold it into a keep-alive.
                Message::KeepAlive
            }
        };

        Ok(Some(msg))
    }
}

/// Reads up to three big-endian u32s, defaulting missing ones to 0 rather
/// than failing: Request/Cancel carry no fallback semantics in the spec,
/// and this crate never acts on them (it only ever leeches), so we parse
/// best-effort instead of dropping an otherwise-healthy session.
fn read_triple_lenient(buf: &mut BytesMut) -> (u32, u32, u32) {
    let a = if buf.len() >= 4 { buf.get_u32() } else { 0 };
    let b = if buf.len() >= 4 { buf.get_u32() } else { 0 };
    let c = if buf.len() >= 4 { buf.get_u32() } else { 0 };
    (a, b, c)
}

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::KeepAlive => {
                dst.put_u32(0);
            }
            Message::Choke => put_empty(dst, MessageId::Choke),
            Message::Unchoke => put_empty(dst, MessageId::Unchoke),
            Message::Interested => put_empty(dst, MessageId::Interested),
            Message::NotInterested => put_empty(dst, MessageId::NotInterested),
            Message::Have { piece_index } => {
                dst.put_u32(5);
                dst.put_u8(MessageId::Have as u8);
                dst.put_u32(piece_index);
            }
            Message::Bitfield(bitfield) => {
                let bytes = bitfield.as_raw_slice();
                dst.put_u32(1 + bytes.len() as u32);
                dst.put_u8(MessageId::Bitfield as u8);
                dst.put_slice(bytes);
            }
            Message::Request { index, begin, length } => {
                put_triple(dst, MessageId::Request, index, begin, length)
            }
            Message::Cancel { index, begin, length } => {
                put_triple(dst, MessageId::Cancel, index, begin, length)
            }
            Message::Piece { index, begin, block } => {
                dst.put_u32(9 + block.len() as u32);
                dst.put_u8(MessageId::Piece as u8);
                dst.put_u32(index);
                dst.put_u32(begin);
                dst.put_slice(&block);
            }
        }
        Ok(())
    }
}

fn put_empty(dst: &mut BytesMut, id: MessageId) {
    dst.put_u32(1);
    dst.put_u8(id as u8);
}

fn put_triple(dst: &mut BytesMut, id: MessageId, a: u32, b: u32, c: u32) {
    dst.put_u32(13);
    dst.put_u8(id as u8);
    dst.put_u32(a);
    dst.put_u32(b);
    dst.put_u32(c);
}
