//! Transport seam between client sessions and the network.
//!
//! A [`Connection`] is split exactly once into a [`ConnectionReader`] and a
//! [`ConnectionWriter`].  The two halves are separate owned values: the inbound
//! pump receives the reader, the outbound pump receives the writer, and no
//! other task can obtain either.  That is how the single reader, single writer
//! rule is enforced by construction rather than by locking.
//!
//! Closing either half closes the whole connection: a pending
//! [`ConnectionReader::recv`] returns [`TransportError::Closed`] and further
//! writes fail.
//!
//! The production implementation is
//! [`crate::infrastructure::ws_conn::WsConnection`]; tests use
//! [`crate::infrastructure::memory_conn`].

use async_trait::async_trait;
use thiserror::Error;

/// Close codes that indicate an orderly or routine shutdown by the peer:
/// normal (1000), going away (1001), no status (1005), abnormal (1006).
const EXPECTED_CLOSE_CODES: [u16; 4] = [1000, 1001, 1005, 1006];

/// One item received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A data message (text or binary payload).
    Message(Vec<u8>),
    /// A keepalive pong answering one of our pings.
    Pong,
}

/// Errors reported by a transport half.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection was closed locally (by either half) or the stream ended.
    #[error("connection closed")]
    Closed,

    /// The peer sent a close frame.
    #[error("peer closed the connection (code {})", display_code(.code))]
    PeerClosed { code: Option<u16> },

    /// The peer sent a message above the transport's size limit.
    #[error("inbound message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    /// The TCP stream ended without a closing handshake.
    #[error("connection reset without closing handshake")]
    Reset,

    /// The peer violated the framing protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_code(code: &Option<u16>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

impl TransportError {
    /// Whether this failure is worth a warning.
    ///
    /// Local closes, resets and routine peer close codes are part of normal
    /// operation; everything else is logged.
    pub fn is_unexpected(&self) -> bool {
        match self {
            TransportError::Closed | TransportError::Reset => false,
            TransportError::PeerClosed { code: None } => false,
            TransportError::PeerClosed { code: Some(code) } => {
                !EXPECTED_CLOSE_CODES.contains(code)
            }
            TransportError::MessageTooLarge { .. }
            | TransportError::Protocol(_)
            | TransportError::Io(_) => true,
        }
    }
}

/// The receiving half of a connection.
#[async_trait]
pub trait ConnectionReader: Send + 'static {
    /// Waits for the next data message or pong.
    ///
    /// Peer pings are answered by the transport and never surface here.
    ///
    /// # Errors
    ///
    /// Any error is terminal; the reader must not be polled again.
    async fn recv(&mut self) -> Result<Inbound, TransportError>;

    /// Closes the whole connection.  Idempotent.
    async fn close(&mut self);
}

/// The sending half of a connection.
///
/// Deadlines are applied by the caller; implementations may block for as
/// long as the underlying stream does.
#[async_trait]
pub trait ConnectionWriter: Send + 'static {
    /// Sends one (possibly coalesced) data frame.
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Sends a keepalive ping control frame.
    async fn send_ping(&mut self) -> Result<(), TransportError>;

    /// Sends a close control frame.
    async fn send_close(&mut self) -> Result<(), TransportError>;

    /// Closes the whole connection.  Idempotent.
    async fn close(&mut self);
}

/// A full-duplex, message-oriented connection that can be split into its
/// reading and writing halves.
pub trait Connection: Send + 'static {
    type Reader: ConnectionReader;
    type Writer: ConnectionWriter;

    /// Consumes the connection and returns its two halves.
    fn split(self) -> (Self::Reader, Self::Writer);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
