//! The crate's error taxonomy.
//!
//! Every fallible operation in this crate returns [`Result`], whose error
//! variants map directly onto the kinds a peer session or the scheduler can
//! encounter. Most variants are handled locally (a peer is dropped, a piece
//! is requeued) and never escape the scheduler; [`Error::Malformed`] is the
//! only one that aborts a download outright.

use std::fmt;

/// The crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error encountered while running a peer session or the swarm
/// scheduler.
#[derive(Debug)]
pub enum Error {
    /// TCP connect failed or timed out.
    DialFailure(std::io::Error),
    /// Handshake exchange failed: short read, bad protocol string, or
    /// mismatched info hash.
    HandshakeFailure(HandshakeError),
    /// Peer violated the expected message ordering or sent a malformed
    /// payload.
    ProtocolViolation(ProtocolError),
    /// Socket read/write error mid-session.
    IoFailure(std::io::Error),
    /// One of the session's deadlines (dial, handshake, first bitfield,
    /// per-piece) was exceeded.
    DeadlineExceeded,
    /// A completed piece's SHA-1 did not match the expected digest.
    IntegrityFailure { index: usize },
    /// The input descriptor itself is invalid (piece digest blob or compact
    /// peer blob not a multiple of their record size). This is the only
    /// variant that aborts the whole download.
    Malformed(&'static str),
}

/// The specific way a handshake exchange failed.
#[derive(Debug)]
pub enum HandshakeError {
    /// The stream closed before a full 68-byte handshake was read.
    ShortRead,
    /// `pstrlen` was zero.
    EmptyProtocolString,
    /// The remote announced a different info hash than ours.
    InfoHashMismatch,
}

/// The specific way a peer violated the wire protocol.
#[derive(Debug)]
pub enum ProtocolError {
    /// The first message after the handshake was not a Bitfield.
    BitfieldNotFirst,
    /// A Piece message's index didn't match the piece being downloaded.
    IndexMismatch { expected: usize, got: usize },
    /// A Piece message's `begin` offset fell outside the destination
    /// buffer.
    OffsetOutOfRange { begin: usize, buf_len: usize },
    /// A Piece message's `begin + block.len()` overran the destination
    /// buffer.
    BlockOverflow { begin: usize, block_len: usize, buf_len: usize },
    /// A Piece message's payload was shorter than the minimum 8 bytes.
    PiecePayloadTooShort,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DialFailure(e) => write!(f, "dial failure: {}", e),
            Error::HandshakeFailure(e) => write!(f, "handshake failure: {}", e),
            Error::ProtocolViolation(e) => write!(f, "protocol violation: {}", e),
            Error::IoFailure(e) => write!(f, "io failure: {}", e),
            Error::DeadlineExceeded => write!(f, "deadline exceeded"),
            Error::IntegrityFailure { index } => {
                write!(f, "piece {} failed integrity check", index)
            }
            Error::Malformed(msg) => write!(f, "malformed input: {}", msg),
        }
    }
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::ShortRead => write!(f, "short read during handshake"),
            HandshakeError::EmptyProtocolString => {
                write!(f, "handshake protocol string length was zero")
            }
            HandshakeError::InfoHashMismatch => {
                write!(f, "remote info hash did not match ours")
            }
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::BitfieldNotFirst => {
                write!(f, "peer's first message after handshake was not a bitfield")
            }
            ProtocolError::IndexMismatch { expected, got } => write!(
                f,
                "piece message index {} did not match expected index {}",
                got, expected
            ),
            ProtocolError::OffsetOutOfRange { begin, buf_len } => write!(
                f,
                "piece message begin offset {} is out of range for a {} byte buffer",
                begin, buf_len
            ),
            ProtocolError::BlockOverflow { begin, block_len, buf_len } => write!(
                f,
                "piece message block of {} bytes at offset {} overruns {} byte buffer",
                block_len, begin, buf_len
            ),
            ProtocolError::PiecePayloadTooShort => {
                write!(f, "piece message payload shorter than 8 bytes")
            }
        }
    }
}

impl std::error::Error for Error {}
impl std::error::Error for HandshakeError {}
impl std::error::Error for ProtocolError {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoFailure(e)
    }
}

impl From<HandshakeError> for Error {
    fn from(e: HandshakeError) -> Self {
        Error::HandshakeFailure(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::ProtocolViolation(e)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::DeadlineExceeded
    }
}
