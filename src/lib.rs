//! A BitTorrent peer-wire engine core: handshake, message codec, and the
//! piece-download scheduler.
//!
//! This crate owns everything from "I have a torrent descriptor and a
//! stream of peer addresses" to "here is the assembled file data". It does
//! not parse bencoded metainfo files, speak to trackers, or write anything
//! to disk; those are a caller's job, built on top of [`TorrentInfo`] and
//! [`scheduler::download`].

pub mod addr;
pub mod bitfield;
pub mod conf;
pub mod error;
pub mod handshake;
pub mod message;
pub mod piece;
pub mod scheduler;
pub mod session;
pub mod torrent;

pub use addr::{marshal_compact_peers, parse_compact_peers};
pub use bitfield::Bitfield;
pub use conf::Conf;
pub use error::{Error, Result};
pub use scheduler::{download, run, Downloader};
pub use session::PeerSession;
pub use torrent::{generate_peer_id, PeerId, PieceIndex, Sha1Hash, TorrentInfo};
