//! The presence session state machine.
//!
//! ```text
//! Disconnected ──attach──▶ SocketOpen ──handshake──▶ AwaitingReady ──READY──▶ Ready
//!       ▲                                                                      │
//!       └───────────────── close frame, EOF, IO error, disconnect() ◀──────────┘
//! ```
//!
//! A [`Session`] owns the transport and the heartbeat task. Three kinds of
//! task touch it concurrently: the read loop, the heartbeat, and callers of
//! [`Session::send_command`] / [`Session::disconnect`]. All of them go
//! through one async mutex around the connection, and every background
//! task carries the generation of the connection it was spawned for, so a
//! task from an old connection can never tear down a new one.

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use tunecord_core::{FailureReason, SessionStatus};
use tunecord_protocol::{
    CloseReason, Command, CommandEnvelope, Frame, FrameReader, FrameWriter, Handshake,
    InboundMessage, Opcode, ProtocolError, ReadyInfo,
};

use crate::config::IpcConfig;
use crate::error::{IpcError, IpcResult, io_failure};
use crate::transport::Locator;

/// Connection phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Disconnected,
    /// Transport open, handshake not yet written.
    SocketOpen,
    /// Handshake written, waiting for the `READY` dispatch.
    AwaitingReady,
    /// Commands may be sent.
    Ready,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Which execution asked for the teardown; it must not abort itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Caller,
    ReadLoop,
    Heartbeat,
}

#[derive(Default)]
struct Connection {
    generation: u64,
    writer: Option<FrameWriter<BoxedWriter>>,
    reader_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
    ready_info: Option<ReadyInfo>,
    last_ack: Option<Instant>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
        }
    }
}

struct Inner {
    client_id: String,
    heartbeat_interval: Duration,
    ready_timeout: Duration,
    write_timeout: Duration,
    conn: Mutex<Connection>,
    /// Wakes a write stuck behind a full socket when `disconnect` is called.
    closing: Notify,
    phase: watch::Sender<SessionPhase>,
    status: watch::Sender<SessionStatus>,
}

/// Handle to a presence session. Clones share the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.inner.client_id)
            .field("phase", &self.phase())
            .field("status", &self.status())
            .finish()
    }
}

impl Session {
    /// Creates a disconnected session.
    pub fn new(config: &IpcConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client_id: config.client_id.clone(),
                heartbeat_interval: config.heartbeat_interval,
                ready_timeout: config.ready_timeout,
                write_timeout: config.write_timeout,
                conn: Mutex::new(Connection::default()),
                closing: Notify::new(),
                phase: watch::Sender::new(SessionPhase::Disconnected),
                status: watch::Sender::new(SessionStatus::Disconnected),
            }),
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    /// Returns a receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// Returns the current phase.
    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.borrow()
    }

    /// Returns a receiver notified on every phase change.
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.inner.phase.subscribe()
    }

    /// Returns true if commands may be sent.
    pub fn is_ready(&self) -> bool {
        self.phase() == SessionPhase::Ready
    }

    /// Returns what the peer reported in its `READY` dispatch.
    pub async fn ready_info(&self) -> Option<ReadyInfo> {
        self.inner.conn.lock().await.ready_info.clone()
    }

    /// Returns when the last heartbeat acknowledgment arrived.
    pub async fn last_heartbeat_ack(&self) -> Option<Instant> {
        self.inner.conn.lock().await.last_ack
    }

    /// Locates the endpoint and starts the handshake.
    pub async fn connect(&self, locator: &Locator) -> IpcResult<()> {
        self.inner.set_status(SessionStatus::Connecting);

        match locator.locate_and_connect().await {
            Ok((stream, _path)) => self.attach(stream).await,
            Err(e) => {
                self.inner
                    .set_status(SessionStatus::Failed(e.failure_reason()));
                Err(e)
            }
        }
    }

    /// Takes ownership of an open stream, starts the read loop and sends
    /// the handshake.
    ///
    /// Returns once the handshake is written; readiness is signalled later
    /// through [`Session::watch_phase`] and [`Session::subscribe`]. A peer
    /// that does not send `READY` within the configured ready timeout fails
    /// the session with [`FailureReason::HandshakeFailed`].
    pub async fn attach<S>(&self, stream: S) -> IpcResult<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let handshake = Frame::from_json(Opcode::Handshake, &Handshake::new(&self.inner.client_id))?;

        let mut conn = self.inner.conn.lock().await;
        if self.phase() != SessionPhase::Disconnected {
            return Err(IpcError::AlreadyConnected);
        }

        conn.generation += 1;
        let generation = conn.generation;

        let (read_half, write_half) = tokio::io::split(stream);
        let writer: BoxedWriter = Box::new(write_half);
        conn.writer = Some(FrameWriter::new(writer));
        self.inner.set_phase(SessionPhase::SocketOpen);
        self.inner.set_status(SessionStatus::Connecting);

        conn.reader_task = Some(tokio::spawn(read_loop(
            Arc::downgrade(&self.inner),
            generation,
            FrameReader::new(read_half),
        )));

        match self.inner.write_locked(&mut conn, &handshake).await {
            Ok(()) => {}
            // disconnect() is waiting for the lock and will close.
            Err(IpcError::NotReady) => return Err(IpcError::NotReady),
            Err(e) => {
                warn!(error = %e, "Failed to send handshake");
                self.inner.close_locked(
                    &mut conn,
                    Origin::Caller,
                    SessionStatus::Failed(FailureReason::TransportError {
                        code: transport_code(&e),
                    }),
                );
                return Err(e);
            }
        }

        debug!(generation, client_id = %self.inner.client_id, "Handshake sent");
        self.inner.set_phase(SessionPhase::AwaitingReady);
        Ok(())
    }

    /// Waits until the session is ready or the connection is gone.
    pub async fn wait_ready(&self) -> IpcResult<()> {
        let mut phase = self.watch_phase();
        let reached = phase
            .wait_for(|p| matches!(p, SessionPhase::Ready | SessionPhase::Disconnected))
            .await
            .map(|p| *p)
            .unwrap_or(SessionPhase::Disconnected);

        match reached {
            SessionPhase::Ready => Ok(()),
            _ => match self.status().failure() {
                Some(FailureReason::PeerClosed) => Err(IpcError::PeerClosed),
                _ => Err(IpcError::NotReady),
            },
        }
    }

    /// Sends a command wrapped in an envelope with a fresh nonce.
    ///
    /// Only valid while ready. A write failure, or a write the peer does
    /// not drain within the write timeout, tears the connection down with a
    /// transport error. Returns the nonce.
    pub async fn send_command<A: Serialize>(&self, cmd: Command, args: A) -> IpcResult<String> {
        let envelope = CommandEnvelope::new(cmd, args);
        let frame = Frame::from_json(Opcode::Frame, &envelope)?;

        let mut conn = self.inner.conn.lock().await;
        if self.phase() != SessionPhase::Ready {
            return Err(IpcError::NotReady);
        }

        match self.inner.write_locked(&mut conn, &frame).await {
            Ok(()) => {}
            Err(IpcError::NotReady) => return Err(IpcError::NotReady),
            Err(e) => {
                warn!(?cmd, error = %e, "Failed to send command");
                self.inner.close_locked(
                    &mut conn,
                    Origin::Caller,
                    SessionStatus::Failed(FailureReason::TransportError {
                        code: transport_code(&e),
                    }),
                );
                return Err(e);
            }
        }

        debug!(?cmd, nonce = %envelope.nonce, "Command sent");
        Ok(envelope.nonce)
    }

    /// Closes the connection and stops the heartbeat.
    ///
    /// Idempotent and safe from any task. A write blocked on a peer that
    /// stopped reading is abandoned rather than waited for.
    pub async fn disconnect(&self) {
        self.inner.closing.notify_waiters();
        let mut conn = self.inner.conn.lock().await;
        self.inner
            .close_locked(&mut conn, Origin::Caller, SessionStatus::Disconnected);
    }
}

fn transport_code(err: &IpcError) -> Option<i32> {
    match err.failure_reason() {
        FailureReason::TransportError { code } => code,
        _ => None,
    }
}

impl Inner {
    fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.phase.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            debug!(from = ?*current, to = ?phase, "Session phase changed");
            *current = phase;
            true
        });
    }

    fn set_status(&self, status: SessionStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            info!(status = %status, "Presence session status changed");
            *current = status;
            true
        });
    }

    /// Writes one frame on the current connection.
    ///
    /// Gives up with [`IpcError::WriteTimeout`] when the peer does not drain
    /// the socket in time, and with [`IpcError::NotReady`] when
    /// `disconnect` is called meanwhile.
    async fn write_locked(&self, conn: &mut Connection, frame: &Frame) -> IpcResult<()> {
        let writer = conn.writer.as_mut().ok_or(IpcError::NotReady)?;
        tokio::select! {
            written = tokio::time::timeout(self.write_timeout, writer.write_frame(frame)) => {
                match written {
                    Ok(result) => Ok(result?),
                    Err(_) => Err(IpcError::WriteTimeout(self.write_timeout)),
                }
            }
            _ = self.closing.notified() => {
                debug!(generation = conn.generation, "Write interrupted by disconnect");
                Err(IpcError::NotReady)
            }
        }
    }

    /// Tears the connection down. Must be called with the lock held.
    fn close_locked(&self, conn: &mut Connection, origin: Origin, status: SessionStatus) {
        let heartbeat = conn.heartbeat_task.take();
        let reader = conn.reader_task.take();
        if let Some(task) = heartbeat.filter(|_| origin != Origin::Heartbeat) {
            task.abort();
        }
        // Aborting the read loop drops its half of the stream, which
        // closes the socket once the writer is gone too.
        if let Some(task) = reader.filter(|_| origin != Origin::ReadLoop) {
            task.abort();
        }

        if conn.writer.take().is_some() {
            debug!(generation = conn.generation, ?origin, "Connection closed");
        }
        conn.ready_info = None;
        conn.last_ack = None;

        self.set_phase(SessionPhase::Disconnected);
        self.set_status(status);
    }

    /// Tears down `generation` unless a newer connection replaced it.
    async fn fail(&self, generation: u64, origin: Origin, reason: FailureReason) {
        let mut conn = self.conn.lock().await;
        if conn.generation != generation || conn.writer.is_none() {
            return;
        }
        self.close_locked(&mut conn, origin, SessionStatus::Failed(reason));
    }

    async fn on_ready(self: &Arc<Self>, generation: u64, info: ReadyInfo) {
        let mut conn = self.conn.lock().await;
        if conn.generation != generation || self.phase() != SessionPhase::AwaitingReady {
            debug!("Ignoring READY outside of handshake");
            return;
        }

        match info.user.as_ref() {
            Some(user) => info!(user = %user.display_name(), "Presence session ready"),
            None => info!("Presence session ready"),
        }

        conn.ready_info = Some(info);
        conn.heartbeat_task = Some(tokio::spawn(heartbeat_loop(
            Arc::downgrade(self),
            generation,
            self.heartbeat_interval,
        )));
        self.set_phase(SessionPhase::Ready);
        self.set_status(SessionStatus::Connected);
    }

    async fn on_heartbeat_ack(&self, generation: u64) {
        let mut conn = self.conn.lock().await;
        if conn.generation == generation {
            conn.last_ack = Some(Instant::now());
        }
        debug!("Heartbeat acknowledged");
    }

    async fn handle_frame(self: &Arc<Self>, generation: u64, frame: Frame) -> ControlFlow<()> {
        match frame.opcode {
            Opcode::Frame => match frame.json::<InboundMessage>() {
                Ok(message) if message.is_ready() => {
                    self.on_ready(generation, message.ready_info()).await;
                }
                Ok(message) if message.is_error() => {
                    let error = message.error_data();
                    warn!(
                        cmd = ?message.cmd,
                        code = error.as_ref().map(|e| e.code),
                        message = error.as_ref().map(|e| e.message.as_str()),
                        "Peer reported an error"
                    );
                }
                Ok(message) => {
                    debug!(cmd = ?message.cmd, evt = ?message.evt, nonce = ?message.nonce, "Frame received");
                }
                Err(e) if self.phase() == SessionPhase::Ready => {
                    warn!(error = %e, "Dropping malformed frame");
                }
                Err(e) => {
                    warn!(error = %e, "Malformed frame during handshake");
                    self.fail(generation, Origin::ReadLoop, FailureReason::HandshakeFailed)
                        .await;
                    return ControlFlow::Break(());
                }
            },
            Opcode::Heartbeat => self.on_heartbeat_ack(generation).await,
            Opcode::Close => {
                let reason: CloseReason = frame.json().unwrap_or_default();
                info!(code = ?reason.code, message = ?reason.message, "Peer closed the session");
                self.fail(generation, Origin::ReadLoop, FailureReason::PeerClosed)
                    .await;
                return ControlFlow::Break(());
            }
            Opcode::Handshake | Opcode::Other(_) => {
                debug!(opcode = frame.opcode.as_i32(), "Ignoring frame with unexpected opcode");
            }
        }
        ControlFlow::Continue(())
    }
}

async fn read_loop<R>(inner: Weak<Inner>, generation: u64, mut reader: FrameReader<R>)
where
    R: AsyncRead + Unpin,
{
    let mut ready_deadline = match inner.upgrade() {
        Some(inner) => Some(Instant::now() + inner.ready_timeout),
        None => return,
    };

    loop {
        let result = match ready_deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, reader.read_frame()).await {
                Ok(result) => result,
                Err(_) => {
                    if let Some(inner) = inner.upgrade() {
                        warn!(generation, "No READY from the peer in time");
                        inner
                            .fail(generation, Origin::ReadLoop, FailureReason::HandshakeFailed)
                            .await;
                    }
                    return;
                }
            },
            None => reader.read_frame().await,
        };
        let Some(inner) = inner.upgrade() else {
            return;
        };

        let reason = match result {
            Ok(Some(frame)) => {
                if inner.handle_frame(generation, frame).await.is_break() {
                    return;
                }
                if inner.phase() == SessionPhase::Ready {
                    ready_deadline = None;
                }
                continue;
            }
            Ok(None) => FailureReason::PeerClosed,
            Err(ProtocolError::Io(e)) => io_failure(&e),
            Err(e) => {
                warn!(error = %e, "Unreadable frame header");
                FailureReason::TransportError { code: None }
            }
        };

        debug!(generation, %reason, "Read loop finished");
        inner.fail(generation, Origin::ReadLoop, reason).await;
        return;
    }
}

async fn heartbeat_loop(inner: Weak<Inner>, generation: u64, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let payload = serde_json::Map::new();

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };

        let mut conn = inner.conn.lock().await;
        if conn.generation != generation {
            return;
        }

        let result = match Frame::from_json(Opcode::Heartbeat, &payload) {
            Ok(frame) => inner.write_locked(&mut conn, &frame).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => debug!(generation, "Heartbeat sent"),
            Err(IpcError::NotReady) => return,
            Err(e) => {
                warn!(error = %e, "Heartbeat failed");
                inner.close_locked(
                    &mut conn,
                    Origin::Heartbeat,
                    SessionStatus::Failed(FailureReason::TransportError {
                        code: transport_code(&e),
                    }),
                );
                return;
            }
        }
    }
}
