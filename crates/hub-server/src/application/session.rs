//! Client sessions: one connection, one outbound queue, two pumps.
//!
//! [`ClientSession::start`] splits the connection, registers the session with
//! the hub and spawns:
//!
//! - the **inbound pump**, the only task that reads from the connection.  It
//!   enforces the idle deadline (reset by every pong), admits and normalizes
//!   messages, and forwards them to the hub.  It never writes.
//! - the **outbound pump**, the only task that writes to the connection.  It
//!   drains the outbound queue (coalescing whatever is already waiting into
//!   one frame) and sends keepalive pings.
//!
//! # Teardown
//!
//! Teardown is always failure-driven; there is no cancellation API.
//!
//! ```text
//! peer closes / idle deadline / oversize ──► inbound pump: unregister, close, exit
//!                                              │ (connection closed)
//!                                              ▼
//! hub drops queue sender ───────────────────► outbound pump: close frame, close, exit
//!
//! write error / write deadline ─────────────► outbound pump: close, exit
//!                                              │ (connection closed)
//!                                              ▼
//!                                            inbound pump: unregister, close, exit
//! ```
//!
//! Whatever starts the teardown, both pumps end and the hub sees at most one
//! effective unregister.

use std::time::Duration;

use hub_core::{FrameBuilder, Message, MessageError, SessionId};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::application::connection::{
    Connection, ConnectionReader, ConnectionWriter, Inbound, TransportError,
};
use crate::application::hub::{HubError, HubHandle};
use crate::domain::HubConfig;

/// Timing and sizing parameters for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub write_wait: Duration,
    pub max_message_size: usize,
    pub queue_capacity: usize,
}

impl From<&HubConfig> for SessionConfig {
    fn from(cfg: &HubConfig) -> Self {
        Self {
            pong_wait: cfg.pong_wait,
            ping_period: cfg.ping_period(),
            write_wait: cfg.write_wait,
            max_message_size: cfg.max_message_size,
            queue_capacity: cfg.queue_capacity,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&HubConfig::default())
    }
}

/// Why a pump stopped.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no pong within the {0:?} idle deadline")]
    IdleTimeout(Duration),

    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Hub(#[from] HubError),
}

impl SessionError {
    /// Whether the teardown deserves a warning instead of a debug line.
    pub fn is_unexpected(&self) -> bool {
        match self {
            SessionError::IdleTimeout(_) | SessionError::WriteTimeout(_) => false,
            SessionError::Hub(_) => false,
            SessionError::Message(_) => true,
            SessionError::Transport(e) => e.is_unexpected(),
        }
    }
}

/// A running session: its id and the two pump tasks.
#[derive(Debug)]
pub struct ClientSession {
    id: SessionId,
    inbound: JoinHandle<Result<(), SessionError>>,
    outbound: JoinHandle<Result<(), SessionError>>,
}

/// Outcome of both pumps once a session has fully ended.
#[derive(Debug)]
pub struct SessionOutcome {
    pub id: SessionId,
    pub inbound: Result<(), SessionError>,
    pub outbound: Result<(), SessionError>,
}

impl ClientSession {
    /// Registers a new session for `conn` with the hub and starts its pumps.
    ///
    /// Registration completes before either pump runs, so the session receives
    /// every message broadcast after this returns, including its own.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has stopped; the connection
    /// is closed in that case.
    pub async fn start<C: Connection>(
        conn: C,
        hub: HubHandle,
        config: SessionConfig,
    ) -> Result<Self, HubError> {
        let id = SessionId::new();
        let (mut reader, mut writer) = conn.split();
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);

        if let Err(e) = hub.register(id, queue_tx).await {
            reader.close().await;
            writer.close().await;
            return Err(e);
        }

        let outbound = tokio::spawn(outbound_pump(id, writer, queue_rx, config));
        let inbound = tokio::spawn(inbound_pump(id, reader, hub, config));
        Ok(Self {
            id,
            inbound,
            outbound,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Waits for both pumps to finish.
    pub async fn join(self) -> SessionOutcome {
        let inbound = flatten(self.inbound.await);
        let outbound = flatten(self.outbound.await);
        SessionOutcome {
            id: self.id,
            inbound,
            outbound,
        }
    }
}

fn flatten(
    joined: Result<Result<(), SessionError>, tokio::task::JoinError>,
) -> Result<(), SessionError> {
    match joined {
        Ok(result) => result,
        // A pump only panics on a bug; surface it as a closed transport.
        Err(e) => {
            warn!("session pump task failed: {e}");
            Err(SessionError::Transport(TransportError::Closed))
        }
    }
}

// ── Inbound pump ──────────────────────────────────────────────────────────────

/// Reads from the connection until it fails, forwarding messages to the hub.
///
/// Always unregisters and closes the connection on the way out.
async fn inbound_pump<R: ConnectionReader>(
    id: SessionId,
    mut reader: R,
    hub: HubHandle,
    config: SessionConfig,
) -> Result<(), SessionError> {
    let result = read_loop(&mut reader, &hub, &config).await;

    // Unregistering an id the hub already evicted is a no-op; the only error
    // left is a stopped hub, which has no members to remove us from.
    if let Err(e) = hub.unregister(id) {
        debug!("session {id}: unregister skipped: {e}");
    }
    reader.close().await;

    match &result {
        Err(e) if e.is_unexpected() => warn!("session {id}: inbound pump stopped: {e}"),
        Err(e) => debug!("session {id}: inbound pump stopped: {e}"),
        Ok(()) => debug!("session {id}: inbound pump stopped"),
    }
    result
}

async fn read_loop<R: ConnectionReader>(
    reader: &mut R,
    hub: &HubHandle,
    config: &SessionConfig,
) -> Result<(), SessionError> {
    // ── Step 1: Arm the idle deadline ────────────────────────────────────────
    // Only a pong moves the deadline; data messages do not.
    let mut deadline = Instant::now() + config.pong_wait;
    loop {
        // ── Step 2: Wait for the next inbound item or the deadline ───────────
        let inbound = match timeout_at(deadline, reader.recv()).await {
            Ok(received) => received,
            Err(_) => return Err(SessionError::IdleTimeout(config.pong_wait)),
        };

        // ── Step 3: Dispatch it ──────────────────────────────────────────────
        // Messages are size-checked and normalized before the hub sees them.
        // A clean close ends the loop with Ok; anything else is an error.
        match inbound {
            Ok(Inbound::Pong) => {
                deadline = Instant::now() + config.pong_wait;
            }
            Ok(Inbound::Message(raw)) => {
                let message = Message::from_inbound(&raw, config.max_message_size)?;
                hub.broadcast(message).await?;
            }
            Err(TransportError::Closed) => return Ok(()),
            Err(TransportError::PeerClosed { code }) if !is_error_code(code) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

fn is_error_code(code: Option<u16>) -> bool {
    TransportError::PeerClosed { code }.is_unexpected()
}

// ── Outbound pump ─────────────────────────────────────────────────────────────

/// Writes queued messages and keepalive pings until the queue is closed or a
/// write fails.
///
/// Always closes the connection on the way out.
async fn outbound_pump<W: ConnectionWriter>(
    id: SessionId,
    mut writer: W,
    mut queue: mpsc::Receiver<Message>,
    config: SessionConfig,
) -> Result<(), SessionError> {
    let result = write_loop(&mut writer, &mut queue, &config).await;
    writer.close().await;

    match &result {
        Err(e) if e.is_unexpected() => warn!("session {id}: outbound pump stopped: {e}"),
        Err(e) => debug!("session {id}: outbound pump stopped: {e}"),
        Ok(()) => debug!("session {id}: outbound queue closed by hub"),
    }
    result
}

async fn write_loop<W: ConnectionWriter>(
    writer: &mut W,
    queue: &mut mpsc::Receiver<Message>,
    config: &SessionConfig,
) -> Result<(), SessionError> {
    // ── Step 1: Start the keepalive ticker ───────────────────────────────────
    // First ping one full period after start, not immediately.
    let mut ticker = interval_at(Instant::now() + config.ping_period, config.ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // ── Step 2: Serve the queue and the ticker ───────────────────────────────
    // This loop is the connection's only writer.  Every write runs under the
    // write deadline and the first failure ends the pump.
    loop {
        tokio::select! {
            next = queue.recv() => match next {
                Some(first) => {
                    let frame = coalesce(first, queue);
                    with_deadline(config.write_wait, writer.send_frame(frame)).await?;
                }
                None => {
                    // Unregistered by the hub: courtesy close frame, failures ignored.
                    let _ = timeout(config.write_wait, writer.send_close()).await;
                    return Ok(());
                }
            },
            _ = ticker.tick() => {
                with_deadline(config.write_wait, writer.send_ping()).await?;
            }
        }
    }
}

/// Packs `first` and every message queued at this instant into one frame.
///
/// Messages that arrive while the frame is being built wait for the next one.
fn coalesce(first: Message, queue: &mut mpsc::Receiver<Message>) -> Vec<u8> {
    let mut frame = FrameBuilder::new(first.as_bytes());
    let pending = queue.len();
    for _ in 0..pending {
        match queue.try_recv() {
            Ok(next) => frame.push(next.as_bytes()),
            Err(_) => break,
        }
    }
    frame.finish()
}

async fn with_deadline<F>(limit: Duration, write: F) -> Result<(), SessionError>
where
    F: std::future::Future<Output = Result<(), TransportError>>,
{
    match timeout(limit, write).await {
        Ok(result) => result.map_err(SessionError::from),
        Err(_) => Err(SessionError::WriteTimeout(limit)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
