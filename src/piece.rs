//! The per-piece, per-session download state machine (§4.6): pipelined
//! block requests up to a fixed backlog, dispatched against whatever the
//! session reads back, until the piece is fully downloaded.

use sha1::{Digest, Sha1};

use crate::{
    conf::Conf,
    error::{Error, Result},
    message::{parse_have, parse_piece_into, Message},
    session::PeerSession,
    torrent::{PieceIndex, Sha1Hash},
};

/// One outstanding piece to download, created once per piece at startup
/// and returned to the work queue unchanged on failure.
#[derive(Clone, Debug)]
pub struct PieceWork {
    pub index: PieceIndex,
    pub length: u32,
    pub expected_digest: Sha1Hash,
}

/// A successfully downloaded and verified piece.
#[derive(Debug)]
pub struct PieceResult {
    pub index: PieceIndex,
    pub buffer: Vec<u8>,
}

/// Downloads every byte of `work` from `session`, respecting the
/// session's choke state and the backlog/deadline limits in `conf`.
///
/// This does not verify the digest; call [`verify_piece`] on the result.
/// Any I/O error, protocol violation, or overrun deadline fails the piece
/// on this session (the caller should requeue the work and, other than
/// for a deadline, drop the session).
pub async fn download_piece(
    session: &mut PeerSession,
    work: &PieceWork,
    conf: &Conf,
) -> Result<Vec<u8>> {
    tokio::time::timeout(conf.piece_timeout, download_piece_inner(session, work, conf))
        .await
        .map_err(|_| Error::DeadlineExceeded)?
}

async fn download_piece_inner(
    session: &mut PeerSession,
    work: &PieceWork,
    conf: &Conf,
) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; work.length as usize];
    let mut downloaded: u32 = 0;
    let mut requested: u32 = 0;
    let mut backlog: usize = 0;

    while downloaded < work.length {
        if !session.choked {
            while backlog < conf.max_backlog && requested < work.length {
                let block_len = std::cmp::min(conf.block_len, work.length - requested);
                session
                    .send_request(work.index as u32, requested, block_len)
                    .await?;
                backlog += 1;
                requested += block_len;
            }
        }

        let msg = session.read().await?;
        match msg {
            Message::Choke => {
                session.choked = true;
            }
            Message::Unchoke => {
                session.choked = false;
            }
            Message::Have { .. } => {
                let index = parse_have(&msg) as usize;
                session.remote_bitfield.set(index);
            }
            Message::Piece { .. } => {
                let written = parse_piece_into(work.index, &mut buffer, &msg)?;
                downloaded += written as u32;
                backlog = backlog.saturating_sub(1);
            }
            // KeepAlive and anything else (Interested, Request, Cancel, a
            // stray Bitfield) are ignored by this dispatcher.
            _ => {}
        }
    }

    Ok(buffer)
}

/// Checks a completed piece's SHA-1 digest against the one expected for
/// it. A mismatch is reported but is not a session-level failure: the
/// session may still be used to retry other pieces.
pub fn verify_piece(work: &PieceWork, buffer: &[u8]) -> Result<()> {
    let digest = Sha1::digest(buffer);
    if digest.as_slice() == work.expected_digest {
        Ok(())
    } else {
        log::warn!(
            "piece {} digest mismatch: expected {}, got {}",
            work.index,
            hex::encode(work.expected_digest),
            hex::encode(digest)
        );
        Err(Error::IntegrityFailure { index: work.index })
    }
}
