//! In-memory transport for tests.
//!
//! [`memory_connection`] returns a [`MemoryConnection`], which implements the
//! transport seam exactly like the WebSocket transport does, together with a
//! [`MemoryPeer`] that plays the remote client:
//!
//! - inject inbound messages, pongs, close frames and resets;
//! - observe every frame, ping and close frame the session writes;
//! - make writes stall (slow peer) or fail (broken pipe);
//! - answer pings automatically with pongs;
//! - count overlapping writes, which must always be zero.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::application::connection::{
    Connection, ConnectionReader, ConnectionWriter, Inbound, TransportError,
};
use crate::infrastructure::close_signal::CloseSignal;

/// Something the session wrote to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Vec<u8>),
    Ping,
    Close,
}

#[derive(Debug)]
enum PeerEvent {
    Item(Inbound),
    Close(Option<u16>),
    Reset,
}

#[derive(Debug, Default)]
struct WriteHooks {
    stall: AtomicBool,
    fail: AtomicBool,
    auto_pong: AtomicBool,
    in_flight: AtomicUsize,
    overlaps: AtomicUsize,
}

#[derive(Debug)]
struct Shared {
    signal: CloseSignal,
    hooks: WriteHooks,
}

/// The session-side end of an in-memory connection.
#[derive(Debug)]
pub struct MemoryConnection {
    reader: MemoryReader,
    writer: MemoryWriter,
}

/// The test-side end of an in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    events: mpsc::UnboundedSender<PeerEvent>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    shared: Arc<Shared>,
}

#[derive(Debug)]
pub struct MemoryReader {
    events: mpsc::UnboundedReceiver<PeerEvent>,
    shared: Arc<Shared>,
}

#[derive(Debug)]
pub struct MemoryWriter {
    outbound: mpsc::UnboundedSender<Outbound>,
    pongs: mpsc::UnboundedSender<PeerEvent>,
    shared: Arc<Shared>,
}

/// Creates a connected pair.
pub fn memory_connection() -> (MemoryConnection, MemoryPeer) {
    let shared = Arc::new(Shared {
        signal: CloseSignal::new(),
        hooks: WriteHooks::default(),
    });
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let conn = MemoryConnection {
        reader: MemoryReader {
            events: events_rx,
            shared: Arc::clone(&shared),
        },
        writer: MemoryWriter {
            outbound: outbound_tx,
            pongs: events_tx.clone(),
            shared: Arc::clone(&shared),
        },
    };
    let peer = MemoryPeer {
        events: events_tx,
        outbound: outbound_rx,
        shared,
    };
    (conn, peer)
}

impl Connection for MemoryConnection {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn split(self) -> (MemoryReader, MemoryWriter) {
        (self.reader, self.writer)
    }
}

impl MemoryPeer {
    /// Delivers a text message to the session.
    pub fn send_text(&self, text: &str) {
        self.send_bytes(text.as_bytes().to_vec());
    }

    /// Delivers a raw message to the session.
    pub fn send_bytes(&self, bytes: Vec<u8>) {
        let _ = self.events.send(PeerEvent::Item(Inbound::Message(bytes)));
    }

    /// Delivers a pong to the session.
    pub fn send_pong(&self) {
        let _ = self.events.send(PeerEvent::Item(Inbound::Pong));
    }

    /// Sends a close frame with the given status code.
    pub fn close_with(&self, code: Option<u16>) {
        let _ = self.events.send(PeerEvent::Close(code));
    }

    /// Drops the connection without a closing handshake.
    pub fn reset(&self) {
        let _ = self.events.send(PeerEvent::Reset);
    }

    /// Answers every ping the session sends with a pong.
    pub fn auto_pong(&self, enabled: bool) {
        self.shared.hooks.auto_pong.store(enabled, Ordering::SeqCst);
    }

    /// Makes every subsequent write hang forever.
    pub fn stall_writes(&self) {
        self.shared.hooks.stall.store(true, Ordering::SeqCst);
    }

    /// Makes every subsequent write fail with a broken pipe.
    pub fn fail_writes(&self) {
        self.shared.hooks.fail.store(true, Ordering::SeqCst);
    }

    /// Waits for the next thing the session writes.  `None` once the writer
    /// half has been dropped and everything written has been read.
    pub async fn next_outbound(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Returns the next written item if one is already available.
    pub fn try_next_outbound(&mut self) -> Option<Outbound> {
        self.outbound.try_recv().ok()
    }

    /// Waits for the next data frame, skipping pings.
    pub async fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.outbound.recv().await? {
                Outbound::Frame(frame) => return Some(frame),
                Outbound::Ping => continue,
                Outbound::Close => return None,
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.signal.is_closed()
    }

    /// Number of times a write started while another was still in flight.
    pub fn overlapping_writes(&self) -> usize {
        self.shared.hooks.overlaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionReader for MemoryReader {
    async fn recv(&mut self) -> Result<Inbound, TransportError> {
        if self.shared.signal.is_closed() {
            return Err(TransportError::Closed);
        }
        tokio::select! {
            _ = self.shared.signal.closed() => Err(TransportError::Closed),
            event = self.events.recv() => match event {
                Some(PeerEvent::Item(item)) => Ok(item),
                Some(PeerEvent::Close(code)) => Err(TransportError::PeerClosed { code }),
                Some(PeerEvent::Reset) => Err(TransportError::Reset),
                None => Err(TransportError::Closed),
            },
        }
    }

    async fn close(&mut self) {
        self.shared.signal.close();
    }
}

impl MemoryWriter {
    async fn write(&mut self, item: Outbound) -> Result<(), TransportError> {
        let hooks = &self.shared.hooks;
        if self.shared.signal.is_closed() {
            return Err(TransportError::Closed);
        }
        if hooks.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "injected write failure",
            )));
        }
        if hooks.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        if hooks.in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
            hooks.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        // Give any would-be concurrent writer a chance to interleave.
        tokio::task::yield_now().await;
        hooks.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.outbound.send(item).map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl ConnectionWriter for MemoryWriter {
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.write(Outbound::Frame(frame)).await
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.write(Outbound::Ping).await?;
        if self.shared.hooks.auto_pong.load(Ordering::SeqCst) {
            let _ = self.pongs.send(PeerEvent::Item(Inbound::Pong));
        }
        Ok(())
    }

    async fn send_close(&mut self) -> Result<(), TransportError> {
        self.write(Outbound::Close).await
    }

    async fn close(&mut self) {
        self.shared.signal.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
