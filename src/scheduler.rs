//! The swarm scheduler (§4.7): a work queue of undownloaded pieces, one
//! worker task per peer, and an aggregator that assembles the finished
//! buffer.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch, Mutex};

use crate::{
    conf::Conf,
    error::Error,
    piece::{download_piece, verify_piece, PieceResult, PieceWork},
    session::PeerSession,
    torrent::{PeerId, Sha1Hash, TorrentInfo},
};

/// The work queue: a bounded, piece-count-sized channel shared by every
/// worker. Receivers can't be cloned, so workers take turns draining it
/// under a mutex; the lock is only ever held across a single `recv`.
type WorkQueue = (mpsc::Sender<PieceWork>, Arc<Mutex<mpsc::Receiver<PieceWork>>>);

/// Runs a full download: spawns one worker per peer yielded by
/// `peer_stream`, pipelines piece requests across them, and returns the
/// assembled torrent contents once every piece has been downloaded and
/// verified.
///
/// `peer_stream` is expected to be effectively unbounded (e.g. fed by
/// periodic tracker re-announces upstream of this crate); the scheduler
/// stops pulling from it as soon as every piece is accounted for.
///
/// This is a thin wrapper over [`run`] for a caller who just wants the
/// finished buffer; use [`run`] directly to receive each [`PieceResult`]
/// as it lands instead (e.g. to stream straight to disk).
pub async fn download(
    torrent: Arc<TorrentInfo>,
    local_peer_id: PeerId,
    peer_stream: impl Stream<Item = std::net::SocketAddr> + Send + 'static,
    conf: Conf,
) -> crate::error::Result<Vec<u8>> {
    let piece_count = torrent.piece_count();
    if piece_count == 0 {
        return Ok(Vec::new());
    }

    let total_length = torrent.total_length;
    let mut result_rx = run(Arc::clone(&torrent), local_peer_id, peer_stream, conf).await;

    let mut buffer = vec![0u8; total_length as usize];
    let mut done = 0;
    while done < piece_count {
        let result = result_rx
            .recv()
            .await
            .expect("run() forwards exactly piece_count results before closing");
        let range = torrent.piece_range(result.index);
        buffer[range.start as usize..range.end as usize].copy_from_slice(&result.buffer);
        done += 1;
        log::info!(
            "({:.1}%) downloaded piece {} ({}/{})",
            done as f64 / piece_count as f64 * 100.0,
            result.index,
            done,
            piece_count
        );
    }

    Ok(buffer)
}

/// A configured download, not yet started against a peer stream.
///
/// This is the higher-level counterpart to the free [`run`] function: it
/// hands back one assembled buffer instead of a stream of individual
/// pieces, mirroring [`download`] as a method-based API.
pub struct Downloader {
    torrent: Arc<TorrentInfo>,
    local_peer_id: PeerId,
    conf: Conf,
}

impl Downloader {
    pub fn new(torrent: Arc<TorrentInfo>, local_peer_id: PeerId, conf: Conf) -> Self {
        Self { torrent, local_peer_id, conf }
    }

    /// Runs the download to completion and returns the assembled buffer.
    pub async fn run(
        self,
        peer_stream: impl Stream<Item = std::net::SocketAddr> + Send + 'static,
    ) -> crate::error::Result<Vec<u8>> {
        download(self.torrent, self.local_peer_id, peer_stream, self.conf).await
    }
}

/// Lower-level entry point: spawns the swarm exactly as [`download`] does,
/// but hands back each verified [`PieceResult`] as it lands rather than
/// waiting to assemble one contiguous buffer, for a caller that wants to
/// stream pieces to disk as they complete.
///
/// The returned receiver yields exactly `torrent.piece_count()` results
/// and then closes.
pub async fn run(
    torrent: Arc<TorrentInfo>,
    local_peer_id: PeerId,
    peer_stream: impl Stream<Item = std::net::SocketAddr> + Send + 'static,
    conf: Conf,
) -> mpsc::Receiver<PieceResult> {
    let piece_count = torrent.piece_count();
    // The queue is sized to hold every piece at once: a worker that fails
    // partway through a piece requeues it inline, and a queue any smaller
    // than `piece_count` could deadlock that requeue against a full
    // channel once enough workers are mid-failure simultaneously.
    let queue_cap = piece_count.max(1);

    let (work_tx, work_rx) = mpsc::channel(queue_cap);
    for index in 0..piece_count {
        let work = PieceWork {
            index,
            length: torrent.piece_len(index),
            expected_digest: torrent.piece_digests[index],
        };
        work_tx.send(work).await.expect("queue sized to piece_count");
    }
    let work_queue: WorkQueue = (work_tx, Arc::new(Mutex::new(work_rx)));

    let (worker_result_tx, mut worker_result_rx) = mpsc::channel::<PieceResult>(queue_cap);
    let (done_tx, done_rx) = watch::channel(false);

    tokio::spawn(spawn_workers(
        torrent.info_hash,
        local_peer_id,
        peer_stream,
        work_queue,
        worker_result_tx,
        done_rx,
        conf,
    ));

    let (out_tx, out_rx) = mpsc::channel::<PieceResult>(queue_cap);
    tokio::spawn(async move {
        let mut done = 0;
        while done < piece_count {
            let Some(result) = worker_result_rx.recv().await else { break };
            done += 1;
            if out_tx.send(result).await.is_err() {
                break;
            }
        }
        // Signals spawn_workers to stop spawning and every in-flight
        // run_worker (each holding its own clone of this receiver) to stop
        // taking new work and return, releasing its socket.
        let _ = done_tx.send(true);
    });

    out_rx
}

/// Pulls peer addresses off `peer_stream` and spawns one worker per peer,
/// until `done_rx` reports the download has finished.
async fn spawn_workers(
    info_hash: Sha1Hash,
    local_peer_id: PeerId,
    peer_stream: impl Stream<Item = std::net::SocketAddr> + Send + 'static,
    work_queue: WorkQueue,
    result_tx: mpsc::Sender<PieceResult>,
    mut done_rx: watch::Receiver<bool>,
    conf: Conf,
) {
    futures::pin_mut!(peer_stream);
    loop {
        tokio::select! {
            biased;
            _ = done_rx.changed() => {
                if *done_rx.borrow() {
                    return;
                }
            }
            addr = peer_stream.next() => {
                let Some(addr) = addr else { return };
                if *done_rx.borrow() {
                    return;
                }
                tokio::spawn(run_worker(
                    addr,
                    info_hash,
                    local_peer_id,
                    work_queue.0.clone(),
                    Arc::clone(&work_queue.1),
                    result_tx.clone(),
                    done_rx.clone(),
                    conf,
                ));
            }
        }
    }
}

/// One peer's worker: dial, handshake, then repeatedly pull work off the
/// queue until it is exhausted, the connection fails, or `done_rx` reports
/// the download has finished (so an in-flight worker that just delivered
/// its last piece doesn't block on the queue forever).
async fn run_worker(
    addr: std::net::SocketAddr,
    info_hash: Sha1Hash,
    local_peer_id: PeerId,
    work_tx: mpsc::Sender<PieceWork>,
    work_rx: Arc<Mutex<mpsc::Receiver<PieceWork>>>,
    result_tx: mpsc::Sender<PieceResult>,
    mut done_rx: watch::Receiver<bool>,
    conf: Conf,
) {
    let mut session = match PeerSession::connect(addr, info_hash, local_peer_id, &conf).await {
        Ok(session) => session,
        Err(e) => {
            log::warn!("peer {} failed to connect: {}", addr, e);
            return;
        }
    };

    if let Err(e) = session.send_unchoke().await {
        log::warn!("peer {} rejected unchoke: {}", addr, e);
        return;
    }
    if let Err(e) = session.send_interested().await {
        log::warn!("peer {} rejected interested: {}", addr, e);
        return;
    }

    loop {
        let work = {
            let mut work_rx = work_rx.lock().await;
            tokio::select! {
                biased;
                changed = done_rx.changed() => {
                    match changed {
                        Ok(()) if *done_rx.borrow() => return,
                        _ => continue,
                    }
                }
                work = work_rx.recv() => match work {
                    Some(work) => work,
                    None => return,
                },
            }
        };

        if !session.remote_bitfield.has(work.index) {
            let _ = work_tx.send(work).await;
            continue;
        }

        let buffer = match download_piece(&mut session, &work, &conf).await {
            Ok(buffer) => buffer,
            Err(e) => {
                log::warn!(
                    "peer {} lost while downloading piece {}: {}",
                    addr,
                    work.index,
                    e
                );
                let _ = work_tx.send(work).await;
                return;
            }
        };

        if let Err(Error::IntegrityFailure { index }) = verify_piece(&work, &buffer) {
            log::warn!("piece {} failed its integrity check from peer {}", index, addr);
            let _ = work_tx.send(work).await;
            continue;
        }

        if session.send_have(work.index as u32).await.is_err() {
            let _ = work_tx.send(work).await;
            return;
        }

        let index = work.index;
        if result_tx.send(PieceResult { index, buffer }).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{handshake::Handshake, message::MessageId, torrent::TorrentInfo};
    use sha1::{Digest, Sha1};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn frame(id: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((payload.len() + 1) as u32).to_be_bytes());
        buf.push(id);
        buf.extend_from_slice(payload);
        buf
    }

    fn piece_frame(index: u32, begin: u32, block: &[u8]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&index.to_be_bytes());
        payload.extend_from_slice(&begin.to_be_bytes());
        payload.extend_from_slice(block);
        frame(MessageId::Piece as u8, &payload)
    }

    /// Serves a whole (possibly multi-piece) torrent from a single fake
    /// seed peer: handshake, an all-ones bitfield, then one Piece message
    /// per requested block until the socket closes.
    async fn spawn_fake_seed(
        info_hash: Sha1Hash,
        pieces: Vec<Vec<u8>>,
    ) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut buf = [0u8; 68];
            stream.read_exact(&mut buf).await.unwrap();
            let hs = Handshake::new(info_hash, [9u8; 20]);
            stream.write_all(&hs.serialize()).await.unwrap();
            stream
                .write_all(&frame(MessageId::Bitfield as u8, &[0b1111_1111]))
                .await
                .unwrap();

            // ignore the Unchoke/Interested the worker sends before
            // requesting, then service every Request until eof.
            while read_and_handle_request(&mut stream, &pieces).await.is_ok() {}
        });

        addr
    }

    async fn read_and_handle_request(
        stream: &mut TcpStream,
        pieces: &[Vec<u8>],
    ) -> std::io::Result<()> {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut rest = vec![0u8; len];
        stream.read_exact(&mut rest).await?;
        if rest.is_empty() || rest[0] != MessageId::Request as u8 {
            return Ok(());
        }
        let index = u32::from_be_bytes(rest[1..5].try_into().unwrap());
        let begin = u32::from_be_bytes(rest[5..9].try_into().unwrap());
        let length = u32::from_be_bytes(rest[9..13].try_into().unwrap()) as usize;
        let block = &pieces[index as usize][begin as usize..begin as usize + length];
        stream
            .write_all(&piece_frame(index, begin, block))
            .await?;
        Ok(())
    }

    fn digest(data: &[u8]) -> Sha1Hash {
        let d = Sha1::digest(data);
        let mut out = [0u8; 20];
        out.copy_from_slice(&d);
        out
    }

    #[tokio::test]
    async fn downloads_two_even_pieces_from_one_seed() {
        let info_hash = [11u8; 20];
        let pieces = vec![vec![1u8; 16_384], vec![2u8; 16_384]];
        let digests: Vec<Sha1Hash> = pieces.iter().map(|p| digest(p)).collect();
        let blob: Vec<u8> = digests.iter().flatten().copied().collect();

        let torrent = Arc::new(
            TorrentInfo::new(
                "t".into(),
                32_768,
                16_384,
                &blob,
                info_hash,
                [1u8; 20],
            )
            .unwrap(),
        );

        let addr = spawn_fake_seed(info_hash, pieces.clone()).await;
        let peer_stream = tokio_stream::once(addr);

        let conf = Conf::default();
        let result = download(torrent, [2u8; 20], peer_stream, conf).await.unwrap();

        let mut expected = pieces[0].clone();
        expected.extend_from_slice(&pieces[1]);
        assert_eq!(result, expected);
    }

    #[tokio::test]
    async fn downloads_single_short_piece() {
        let info_hash = [12u8; 20];
        let piece = vec![3u8; 3_616];
        let digests = vec![digest(&piece)];
        let blob: Vec<u8> = digests.iter().flatten().copied().collect();

        let torrent = Arc::new(
            TorrentInfo::new("t".into(), 3_616, 16_384, &blob, info_hash, [1u8; 20]).unwrap(),
        );

        let addr = spawn_fake_seed(info_hash, vec![piece.clone()]).await;
        let peer_stream = tokio_stream::once(addr);

        let conf = Conf::default();
        let result = download(torrent, [2u8; 20], peer_stream, conf).await.unwrap();
        assert_eq!(result, piece);
    }

    #[tokio::test]
    async fn run_streams_each_piece_result_and_then_closes() {
        let info_hash = [13u8; 20];
        let pieces = vec![vec![4u8; 16_384], vec![5u8; 16_384]];
        let digests: Vec<Sha1Hash> = pieces.iter().map(|p| digest(p)).collect();
        let blob: Vec<u8> = digests.iter().flatten().copied().collect();

        let torrent = Arc::new(
            TorrentInfo::new("t".into(), 32_768, 16_384, &blob, info_hash, [1u8; 20]).unwrap(),
        );

        let addr = spawn_fake_seed(info_hash, pieces.clone()).await;
        let peer_stream = tokio_stream::once(addr);

        let conf = Conf::default();
        let mut result_rx = run(torrent, [2u8; 20], peer_stream, conf).await;

        let mut received = Vec::new();
        while let Some(result) = result_rx.recv().await {
            received.push(result);
        }
        received.sort_by_key(|r| r.index);

        assert_eq!(received.len(), 2);
        assert_eq!(received[0].buffer, pieces[0]);
        assert_eq!(received[1].buffer, pieces[1]);
    }

    #[tokio::test]
    async fn downloader_run_matches_the_free_function() {
        let info_hash = [14u8; 20];
        let piece = vec![6u8; 16_384];
        let digests = vec![digest(&piece)];
        let blob: Vec<u8> = digests.iter().flatten().copied().collect();

        let torrent = Arc::new(
            TorrentInfo::new("t".into(), 16_384, 16_384, &blob, info_hash, [1u8; 20]).unwrap(),
        );

        let addr = spawn_fake_seed(info_hash, vec![piece.clone()]).await;
        let peer_stream = tokio_stream::once(addr);

        let result = Downloader::new(torrent, [2u8; 20], Conf::default())
            .run(peer_stream)
            .await
            .unwrap();
        assert_eq!(result, piece);
    }
}
