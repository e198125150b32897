//! The torrent descriptor (§3): the immutable value the core receives as
//! input. Parsing this out of a bencoded metainfo file is an external
//! collaborator's job; this crate only consumes the decoded form.

use crate::error::{Error, Result};

/// A SHA-1 digest, 20 bytes long.
pub type Sha1Hash = [u8; 20];

/// A client-local peer id, 20 arbitrary bytes, random per run.
pub type PeerId = [u8; 20];

/// The index of a piece within a torrent.
pub type PieceIndex = usize;

const DIGEST_LEN: usize = 20;

/// Generates a fresh, random local peer id.
///
/// See the guidelines for choosing a peer id:
/// http://bittorrent.org/beps/bep_0020.html. This crate doesn't follow
/// any particular client-naming convention, it just needs 20 bytes that
/// are unique enough not to collide with another peer on the swarm.
pub fn generate_peer_id() -> PeerId {
    rand::random()
}

/// The immutable metadata a download is run against.
#[derive(Clone, Debug)]
pub struct TorrentInfo {
    pub name: String,
    pub total_length: u64,
    pub piece_length: u32,
    /// Each entry is the expected SHA-1 digest of the corresponding piece.
    pub piece_digests: Vec<Sha1Hash>,
    pub info_hash: Sha1Hash,
    pub local_peer_id: PeerId,
}

impl TorrentInfo {
    /// Builds a descriptor from its fields, decoding the concatenated
    /// piece-digest blob (as it comes off a bencoded metainfo `pieces`
    /// field) into individual 20-byte digests.
    ///
    /// Fails with [`Error::Malformed`] if the blob's length is not a
    /// multiple of 20.
    pub fn new(
        name: String,
        total_length: u64,
        piece_length: u32,
        piece_digest_blob: &[u8],
        info_hash: Sha1Hash,
        local_peer_id: PeerId,
    ) -> Result<Self> {
        if piece_digest_blob.len() % DIGEST_LEN != 0 {
            return Err(Error::Malformed(
                "piece digest blob length is not a multiple of 20",
            ));
        }

        let piece_digests = piece_digest_blob
            .chunks_exact(DIGEST_LEN)
            .map(|chunk| {
                let mut digest = [0u8; DIGEST_LEN];
                digest.copy_from_slice(chunk);
                digest
            })
            .collect();

        Ok(Self {
            name,
            total_length,
            piece_length,
            piece_digests,
            info_hash,
            local_peer_id,
        })
    }

    /// The number of pieces in this torrent.
    pub fn piece_count(&self) -> usize {
        self.piece_digests.len()
    }

    /// The byte range `[start, end)` piece `index` spans within the
    /// torrent, clamped to `total_length` for the last piece.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds; callers only ever iterate
    /// `0..piece_count()`.
    pub fn piece_range(&self, index: PieceIndex) -> std::ops::Range<u64> {
        let piece_length = self.piece_length as u64;
        let start = index as u64 * piece_length;
        let end = std::cmp::min(start + piece_length, self.total_length);
        start..end
    }

    /// The length in bytes of piece `index`, accounting for a possibly
    /// shorter last piece.
    pub fn piece_len(&self, index: PieceIndex) -> u32 {
        let range = self.piece_range(index);
        (range.end - range.start) as u32
    }
}
