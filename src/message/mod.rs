//! The length-prefixed peer wire message framing and the nine message
//! kinds (§4.4): `[u32 length N][u8 id][N-1 bytes payload]`, with `N == 0`
//! a keep-alive.

pub mod codec;

use crate::{bitfield::Bitfield, error::ProtocolError};

/// The wire id of a non-keep-alive message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl MessageId {
    fn from_u8(id: u8) -> Option<Self> {
        Some(match id {
            0 => Self::Choke,
            1 => Self::Unchoke,
            2 => Self::Interested,
            3 => Self::NotInterested,
            4 => Self::Have,
            5 => Self::Bitfield,
            6 => Self::Request,
            7 => Self::Piece,
            8 => Self::Cancel,
            _ => return None,
        })
    }
}

/// A single peer wire message. A keep-alive carries no id and no payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield(Bitfield),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {
    /// The wire id of this message, or `None` for a keep-alive.
    pub fn id(&self) -> Option<MessageId> {
        match self {
            Message::KeepAlive => None,
            Message::Choke => Some(MessageId::Choke),
            Message::Unchoke => Some(MessageId::Unchoke),
            Message::Interested => Some(MessageId::Interested),
            Message::NotInterested => Some(MessageId::NotInterested),
            Message::Have { .. } => Some(MessageId::Have),
            Message::Bitfield(_) => Some(MessageId::Bitfield),
            Message::Request { .. } => Some(MessageId::Request),
            Message::Piece { .. } => Some(MessageId::Piece),
            Message::Cancel { .. } => Some(MessageId::Cancel),
        }
    }
}

/// Extracts the piece index out of a Have message.
///
/// If `msg` is not a Have (which, by construction, only happens if the
/// wire payload was parseable), this yields 0 silently rather than
/// failing: a malformed or unexpected Have is a non-fatal no-op, not a
/// reason to drop the session.
pub fn parse_have(msg: &Message) -> u32 {
    match msg {
        Message::Have { piece_index } => *piece_index,
        _ => 0,
    }
}

/// Copies a Piece message's block into `dest`, validating that it belongs
/// to the piece currently being downloaded and fits within the buffer.
///
/// Returns the number of bytes written.
pub fn parse_piece_into(
    expected_index: usize,
    dest: &mut [u8],
    msg: &Message,
) -> Result<usize, ProtocolError> {
    let Message::Piece { index, begin, block } = msg else {
        // Callers only invoke this once they've matched on
        // `Message::Piece`; reaching here would be a caller bug, not a
        // protocol violation, but we fail safe rather than panic.
        return Ok(0);
    };

    let index = *index as usize;
    if index != expected_index {
        return Err(ProtocolError::IndexMismatch {
            expected: expected_index,
            got: index,
        });
    }

    let begin = *begin as usize;
    if begin >= dest.len() {
        return Err(ProtocolError::OffsetOutOfRange {
            begin,
            buf_len: dest.len(),
        });
    }

    if begin + block.len() > dest.len() {
        return Err(ProtocolError::BlockOverflow {
            begin,
            block_len: block.len(),
            buf_len: dest.len(),
        });
    }

    dest[begin..begin + block.len()].copy_from_slice(block);
    Ok(block.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_round_trips_through_u8() {
        for id in 0u8..=8 {
            let parsed = MessageId::from_u8(id).unwrap();
            assert_eq!(parsed as u8, id);
        }
        assert!(MessageId::from_u8(9).is_none());
    }

    #[test]
    fn parse_have_extracts_index() {
        let msg = Message::Have { piece_index: 42 };
        assert_eq!(parse_have(&msg), 42);
    }

    #[test]
    fn parse_have_on_other_message_yields_zero() {
        assert_eq!(parse_have(&Message::Choke), 0);
    }

    #[test]
    fn parse_piece_into_copies_block_at_offset() {
        let mut dest = vec![0u8; 16];
        let msg = Message::Piece {
            index: 3,
            begin: 4,
            block: vec![1, 2, 3, 4],
        };
        let written = parse_piece_into(3, &mut dest, &msg).unwrap();
        assert_eq!(written, 4);
        assert_eq!(&dest[4..8], &[1, 2, 3, 4]);
    }

    #[test]
    fn parse_piece_into_rejects_index_mismatch() {
        let mut dest = vec![0u8; 16];
        let msg = Message::Piece {
            index: 5,
            begin: 0,
            block: vec![1],
        };
        assert!(matches!(
            parse_piece_into(3, &mut dest, &msg),
            Err(ProtocolError::IndexMismatch { expected: 3, got: 5 })
        ));
    }

    #[test]
    fn parse_piece_into_rejects_offset_out_of_range() {
        let mut dest = vec![0u8; 4];
        let msg = Message::Piece {
            index: 0,
            begin: 4,
            block: vec![1],
        };
        assert!(matches!(
            parse_piece_into(0, &mut dest, &msg),
            Err(ProtocolError::OffsetOutOfRange { begin: 4, buf_len: 4 })
        ));
    }

    #[test]
    fn parse_piece_into_rejects_block_overflow() {
        let mut dest = vec![0u8; 4];
        let msg = Message::Piece {
            index: 0,
            begin: 2,
            block: vec![1, 2, 3],
        };
        assert!(matches!(
            parse_piece_into(0, &mut dest, &msg),
            Err(ProtocolError::BlockOverflow {
                begin: 2,
                block_len: 3,
                buf_len: 4
            })
        ));
    }
}
