//! Fake peer for unit tests.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadHalf, WriteHalf, duplex};
use tunecord_protocol::{Frame, FrameReader, FrameWriter, Opcode};

use crate::session::Session;

pub(crate) const WAIT: Duration = Duration::from_secs(5);

/// The other end of a session's transport.
pub(crate) struct Peer<S> {
    pub reader: FrameReader<ReadHalf<S>>,
    pub writer: FrameWriter<WriteHalf<S>>,
}

impl<S: AsyncRead + AsyncWrite> Peer<S> {
    pub fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FrameReader::new(read_half),
            writer: FrameWriter::new(write_half),
        }
    }

    pub async fn expect_frame(&mut self) -> Frame {
        tokio::time::timeout(WAIT, self.reader.read_frame())
            .await
            .expect("peer timed out")
            .unwrap()
            .expect("client closed the stream")
    }

    /// Reads frames until one with `opcode` arrives.
    pub async fn expect_opcode(&mut self, opcode: Opcode) -> Frame {
        loop {
            let frame = self.expect_frame().await;
            if frame.opcode == opcode {
                return frame;
            }
        }
    }

    pub async fn send(&mut self, opcode: Opcode, payload: Value) {
        self.writer.write_json(opcode, &payload).await.unwrap();
    }

    pub async fn send_ready(&mut self) {
        self.send(
            Opcode::Frame,
            json!({
                "cmd": "DISPATCH",
                "evt": "READY",
                "data": {"v": 1, "user": {"id": "1", "username": "listener"}}
            }),
        )
        .await;
    }

    /// Consumes the handshake and answers with `READY`.
    pub async fn accept(&mut self) {
        let handshake = self.expect_frame().await;
        assert_eq!(handshake.opcode, Opcode::Handshake);
        self.send_ready().await;
    }
}

const CAPACITY: usize = 64 * 1024;

/// Attaches an in-memory transport to `session`.
pub(crate) async fn attached(session: &Session) -> Peer<DuplexStream> {
    attached_with_capacity(session, CAPACITY).await
}

/// Like [`attached`], with `capacity` bytes of buffering in each direction.
pub(crate) async fn attached_with_capacity(
    session: &Session,
    capacity: usize,
) -> Peer<DuplexStream> {
    let (client, server) = duplex(capacity);
    session.attach(client).await.unwrap();
    Peer::new(server)
}

/// Attaches an in-memory transport and completes the handshake.
pub(crate) async fn ready(session: &Session) -> Peer<DuplexStream> {
    ready_with_capacity(session, CAPACITY).await
}

pub(crate) async fn ready_with_capacity(
    session: &Session,
    capacity: usize,
) -> Peer<DuplexStream> {
    let mut peer = attached_with_capacity(session, capacity).await;
    peer.accept().await;
    tokio::time::timeout(WAIT, session.wait_ready())
        .await
        .unwrap()
        .unwrap();
    peer
}
