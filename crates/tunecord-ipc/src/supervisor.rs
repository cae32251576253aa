//! Reconnection supervisor.
//!
//! The supervisor owns the connect/retry loop: it runs one attempt, waits
//! for that connection to fail, and arms a single retry timer. A sandboxed
//! failure is never retried.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tunecord_core::{FailureReason, SessionStatus};

use crate::session::Session;
use crate::transport::Locator;

/// Commands that can be sent to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorCommand {
    /// Cancel any pending retry and attempt a connection now.
    ReconnectNow,
    /// Disconnect and stop supervising.
    Stop,
}

/// Supervisor state, observable through [`SupervisorHandle`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorState {
    /// Connection attempts started so far.
    pub attempts: u32,
    /// Deadline of the armed retry timer, if any.
    pub pending_retry: Option<Instant>,
    /// Reason of the most recent failure.
    pub last_failure: Option<FailureReason>,
    /// True once the loop has exited.
    pub stopped: bool,
}

impl SupervisorState {
    /// Returns true if the last failure rules out any further attempt.
    pub fn gave_up(&self) -> bool {
        self.last_failure.is_some_and(|reason| !reason.is_retryable())
    }
}

/// What ended a connection attempt.
enum Next {
    Failed(FailureReason),
    /// The session was disconnected by someone else.
    Idle,
    Reconnect,
    Stop,
}

/// Keeps a [`Session`] connected.
pub struct Supervisor {
    session: Session,
    locator: Locator,
    retry_delay: Duration,
    state: watch::Sender<SupervisorState>,
    command_tx: mpsc::Sender<SupervisorCommand>,
    command_rx: Option<mpsc::Receiver<SupervisorCommand>>,
}

impl Supervisor {
    /// Creates a supervisor for `session`.
    pub fn new(session: Session, locator: Locator, retry_delay: Duration) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            session,
            locator,
            retry_delay,
            state: watch::Sender::new(SupervisorState::default()),
            command_tx,
            command_rx: Some(command_rx),
        }
    }

    /// Returns a handle for sending commands to the supervisor.
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.subscribe(),
        }
    }

    /// Runs the connect/retry loop until stopped.
    pub async fn run(mut self) {
        let Some(mut command_rx) = self.command_rx.take() else {
            warn!("Supervisor already ran");
            return;
        };

        info!(
            dir = %self.locator.dir().display(),
            retry_secs = self.retry_delay.as_secs_f64(),
            "Supervisor started"
        );

        'supervise: loop {
            self.state.send_modify(|state| {
                state.attempts += 1;
                state.pending_retry = None;
            });

            let next = match self.session.connect(&self.locator).await {
                Ok(()) => self.watch_connection(&mut command_rx).await,
                Err(e) => Next::Failed(e.failure_reason()),
            };

            let reason = match next {
                Next::Failed(reason) => reason,
                Next::Reconnect => continue,
                Next::Stop => break,
                Next::Idle => match command_rx.recv().await {
                    Some(SupervisorCommand::ReconnectNow) => continue,
                    Some(SupervisorCommand::Stop) | None => break,
                },
            };

            self.state
                .send_modify(|state| state.last_failure = Some(reason));

            if !reason.is_retryable() {
                warn!(%reason, "Connection failed permanently, not retrying");
                loop {
                    match command_rx.recv().await {
                        Some(SupervisorCommand::ReconnectNow) => {
                            debug!("Ignoring reconnect request after permanent failure");
                        }
                        Some(SupervisorCommand::Stop) | None => break 'supervise,
                    }
                }
            }

            let deadline = Instant::now() + self.retry_delay;
            self.state
                .send_modify(|state| state.pending_retry = Some(deadline));
            info!(
                %reason,
                retry_secs = self.retry_delay.as_secs_f64(),
                "Connection failed, retry scheduled"
            );

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    debug!("Retry timer fired");
                }
                cmd = command_rx.recv() => match cmd {
                    Some(SupervisorCommand::ReconnectNow) => {
                        debug!("Pending retry cancelled by reconnect request");
                    }
                    Some(SupervisorCommand::Stop) | None => break,
                },
            }
        }

        self.session.disconnect().await;
        self.state.send_modify(|state| {
            state.pending_retry = None;
            state.stopped = true;
        });
        info!("Supervisor stopped");
    }

    async fn watch_connection(&self, command_rx: &mut mpsc::Receiver<SupervisorCommand>) -> Next {
        let mut status = self.session.subscribe();
        let ended = async {
            status
                .wait_for(|s| matches!(s, SessionStatus::Failed(_) | SessionStatus::Disconnected))
                .await
                .ok()
                .and_then(|s| s.failure())
        };

        tokio::select! {
            failure = ended => match failure {
                Some(reason) => Next::Failed(reason),
                None => Next::Idle,
            },
            cmd = command_rx.recv() => match cmd {
                Some(SupervisorCommand::ReconnectNow) => {
                    info!("Reconnecting on request");
                    self.session.disconnect().await;
                    Next::Reconnect
                }
                Some(SupervisorCommand::Stop) | None => Next::Stop,
            },
        }
    }
}

/// Handle for sending commands to a running supervisor.
#[derive(Clone, Debug)]
pub struct SupervisorHandle {
    command_tx: mpsc::Sender<SupervisorCommand>,
    state: watch::Receiver<SupervisorState>,
}

impl SupervisorHandle {
    /// Cancels a pending retry and reconnects immediately.
    pub async fn reconnect_now(&self) -> Result<(), mpsc::error::SendError<SupervisorCommand>> {
        self.command_tx.send(SupervisorCommand::ReconnectNow).await
    }

    /// Stops the supervisor.
    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<SupervisorCommand>> {
        self.command_tx.send(SupervisorCommand::Stop).await
    }

    /// Returns the current supervisor state.
    pub fn state(&self) -> SupervisorState {
        self.state.borrow().clone()
    }

    /// Returns a receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }
}
