//! Tunable constants for the peer-wire engine: block granularity, request
//! pipelining depth, and the deadlines guarding each blocking point.

use std::time::Duration;

/// The only block length we deal with (except for possibly the last block
/// in a piece). It is the widely used and accepted 16 KiB.
pub const BLOCK_LEN: u32 = 0x4000;

/// The maximum number of block requests a session keeps outstanding at
/// once, to keep the peer's upload pipe saturated while bounding memory.
pub const MAX_BACKLOG: usize = 5;

/// Configuration for a single download, overridable per call.
#[derive(Clone, Copy, Debug)]
pub struct Conf {
    /// TCP connect deadline.
    pub dial_timeout: Duration,
    /// Deadline for the entire handshake exchange.
    pub handshake_timeout: Duration,
    /// Deadline for receiving the first (bitfield) message after the
    /// handshake.
    pub bitfield_timeout: Duration,
    /// Wall-clock deadline for downloading one piece on one session,
    /// reset at the start of every piece.
    pub piece_timeout: Duration,
    /// Maximum outstanding block requests per session.
    pub max_backlog: usize,
    /// The block request granule.
    pub block_len: u32,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            bitfield_timeout: Duration::from_secs(10),
            piece_timeout: Duration::from_secs(30),
            max_backlog: MAX_BACKLOG,
            block_len: BLOCK_LEN,
        }
    }
}
