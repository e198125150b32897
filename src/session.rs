//! One peer connection's lifecycle (§4.5): dial, handshake, first-bitfield
//! intake, then a thin send/receive API the piece download state machine
//! drives.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, FramedParts};

use crate::{
    bitfield::Bitfield,
    conf::Conf,
    error::{Error, ProtocolError, Result},
    handshake::{Handshake, HandshakeCodec},
    message::{codec::MessageCodec, Message},
    torrent::{PeerId, Sha1Hash},
};

/// An established, handshaken connection to a single peer.
///
/// Sessions are worker-local: exactly one task owns a `PeerSession` at a
/// time, and it is closed on every exit path (normal return, error, or
/// timeout) by simply being dropped.
pub struct PeerSession {
    addr: SocketAddr,
    socket: Framed<TcpStream, MessageCodec>,
    /// The piece availability the peer advertised via its opening
    /// Bitfield, refined by any Have messages received since.
    pub remote_bitfield: Bitfield,
    /// Whether the peer currently has us choked.
    pub choked: bool,
}

impl PeerSession {
    /// Dials `addr`, performs the handshake, and waits for the peer's
    /// opening Bitfield, per the deadlines in `conf`.
    ///
    /// Fails with [`Error::DialFailure`] if the connection cannot be
    /// established, [`Error::HandshakeFailure`] if the handshake fails or
    /// the info hash mismatches, [`Error::ProtocolViolation`] if anything
    /// other than a Bitfield arrives first, or [`Error::DeadlineExceeded`]
    /// if any step overruns its deadline.
    pub async fn connect(
        addr: SocketAddr,
        info_hash: Sha1Hash,
        local_peer_id: PeerId,
        conf: &Conf,
    ) -> Result<Self> {
        log::info!(
            "Connecting to peer {} for torrent {}",
            addr,
            hex::encode(info_hash)
        );
        let stream = tokio::time::timeout(conf.dial_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::DeadlineExceeded)?
            .map_err(Error::DialFailure)?;
        log::debug!("Connected to peer {}", addr);

        let mut handshake_socket = Framed::new(stream, HandshakeCodec);
        let local_handshake = Handshake::new(info_hash, local_peer_id);

        let remote_handshake = tokio::time::timeout(conf.handshake_timeout, async {
            handshake_socket.send(local_handshake).await?;
            match handshake_socket.next().await {
                Some(handshake) => handshake,
                None => Err(crate::error::HandshakeError::ShortRead.into()),
            }
        })
        .await
        .map_err(|_| Error::DeadlineExceeded)??;

        if remote_handshake.info_hash != info_hash {
            log::warn!("Peer {} sent mismatched info hash", addr);
            return Err(crate::error::HandshakeError::InfoHashMismatch.into());
        }
        log::debug!("Completed handshake with peer {}", addr);

        // Switch to the steady-state message codec, carrying over any
        // bytes the peer already sent past the handshake.
        let old_parts = handshake_socket.into_parts();
        let mut new_parts = FramedParts::new(old_parts.io, MessageCodec);
        new_parts.read_buf = old_parts.read_buf;
        new_parts.write_buf = old_parts.write_buf;
        let mut socket = Framed::from_parts(new_parts);

        let first_msg = tokio::time::timeout(conf.bitfield_timeout, socket.next())
            .await
            .map_err(|_| Error::DeadlineExceeded)?
            .ok_or(Error::ProtocolViolation(ProtocolError::BitfieldNotFirst))??;

        let remote_bitfield = match first_msg {
            Message::Bitfield(bitfield) => bitfield,
            other => {
                log::warn!(
                    "Peer {} sent {:?} instead of a bitfield first",
                    addr,
                    other.id()
                );
                return Err(ProtocolError::BitfieldNotFirst.into());
            }
        };
        log::info!("Peer {} session established", addr);

        Ok(Self { addr, socket, remote_bitfield, choked: true })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn send_interested(&mut self) -> Result<()> {
        self.send(Message::Interested).await
    }

    pub async fn send_not_interested(&mut self) -> Result<()> {
        self.send(Message::NotInterested).await
    }

    pub async fn send_unchoke(&mut self) -> Result<()> {
        self.send(Message::Unchoke).await
    }

    pub async fn send_choke(&mut self) -> Result<()> {
        self.send(Message::Choke).await
    }

    pub async fn send_request(&mut self, index: u32, begin: u32, length: u32) -> Result<()> {
        self.send(Message::Request { index, begin, length }).await
    }

    pub async fn send_have(&mut self, index: u32) -> Result<()> {
        self.send(Message::Have { piece_index: index }).await
    }

    async fn send(&mut self, msg: Message) -> Result<()> {
        self.socket.send(msg).await
    }

    /// Reads the next frame, which may be a keep-alive.
    pub async fn read(&mut self) -> Result<Message> {
        match self.socket.next().await {
            Some(msg) => msg,
            None => Err(Error::IoFailure(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            ))),
        }
    }
}
