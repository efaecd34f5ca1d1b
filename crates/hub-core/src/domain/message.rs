//! The immutable message value fanned out by the hub.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::protocol::normalize::normalize;

/// Default inbound size limit in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 512;

/// Errors raised while admitting an inbound payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    /// The raw payload exceeds the configured inbound limit.
    #[error("inbound message of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
}

/// A normalized, immutable message.
///
/// The payload is reference counted, so the hub hands the same allocation to
/// every member queue; cloning a `Message` never copies bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Message(Arc<[u8]>);

impl Message {
    /// Admits a raw inbound payload: checks it against `max_size`, then
    /// normalizes it.
    ///
    /// The limit applies to the raw bytes as received, before trimming.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::TooLarge`] when `raw.len() > max_size`.
    pub fn from_inbound(raw: &[u8], max_size: usize) -> Result<Self, MessageError> {
        if raw.len() > max_size {
            return Err(MessageError::TooLarge {
                size: raw.len(),
                limit: max_size,
            });
        }
        Ok(Self(normalize(raw).into()))
    }

    /// Wraps bytes verbatim, without normalization.
    ///
    /// Intended for hub-originated messages and tests; client input must go
    /// through [`Message::from_inbound`].
    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self(Arc::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message({:?})", String::from_utf8_lossy(&self.0))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
