//! Outbound frame coalescing.
//!
//! When a session's outbound queue holds several messages at the moment the
//! writer wakes up, they are written as a single transport frame:
//!
//! ```text
//! [msg 1][\n][msg 2][\n][msg 3]
//! ```
//!
//! Each message is preceded by exactly one [`FRAME_DELIMITER`] except the
//! first.  Receivers recover the individual messages with [`split_frame`].

use super::FRAME_DELIMITER;

/// Accumulates one outbound frame.
///
/// A frame always contains at least one message, so the builder is opened
/// with the first one.
///
/// ```rust
/// use hub_core::FrameBuilder;
///
/// let mut frame = FrameBuilder::new(b"a");
/// frame.push(b"b");
/// assert_eq!(frame.message_count(), 2);
/// assert_eq!(frame.finish(), b"a\nb".to_vec());
/// ```
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    buf: Vec<u8>,
    count: usize,
}

impl FrameBuilder {
    /// Opens a frame whose first message is `first`.
    pub fn new(first: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(first.len());
        buf.extend_from_slice(first);
        Self { buf, count: 1 }
    }

    /// Appends `next` after a single delimiter.
    pub fn push(&mut self, next: &[u8]) {
        self.buf.reserve(next.len() + 1);
        self.buf.push(FRAME_DELIMITER);
        self.buf.extend_from_slice(next);
        self.count += 1;
    }

    /// Number of messages written into the frame so far.
    pub fn message_count(&self) -> usize {
        self.count
    }

    /// Current encoded length in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` when the frame holds no bytes (a single empty message).
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Closes the frame and returns its bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Splits a coalesced frame back into its messages, in write order.
pub fn split_frame(frame: &[u8]) -> impl Iterator<Item = &[u8]> {
    frame.split(|b| *b == FRAME_DELIMITER)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
