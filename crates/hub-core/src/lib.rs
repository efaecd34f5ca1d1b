//! # hub-core
//!
//! Shared, I/O-free building blocks for the broadcast hub: the message model,
//! inbound normalization and the outbound frame coalescing format.
//!
//! The crate has no dependency on tokio, sockets or WebSocket libraries, so
//! everything here can be tested synchronously.
//!
//! - **`protocol`** – How messages look on the wire.  Inbound payloads are
//!   normalized (embedded newlines replaced, whitespace trimmed) and outbound
//!   messages already waiting in a queue are packed into one frame separated
//!   by [`protocol::FRAME_DELIMITER`].
//!
//! - **`domain`** – The [`Message`] value fanned out by the hub and the
//!   [`SessionId`] that identifies a member of the hub.

pub mod domain;
pub mod protocol;

pub use domain::message::{Message, MessageError, DEFAULT_MAX_MESSAGE_SIZE};
pub use domain::session_id::SessionId;
pub use protocol::frame::{split_frame, FrameBuilder};
pub use protocol::normalize::{is_normalized, normalize};
pub use protocol::{FRAME_DELIMITER, NEWLINE_REPLACEMENT};
