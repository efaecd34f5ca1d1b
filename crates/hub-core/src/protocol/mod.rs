//! Wire-level rules: inbound normalization and outbound frame coalescing.
//!
//! The two halves depend on each other: [`FRAME_DELIMITER`] separates messages
//! inside a coalesced frame, so normalization must remove every occurrence of
//! it from inbound payloads.  Otherwise a client could forge message
//! boundaries inside a frame delivered to other clients.

pub mod frame;
pub mod normalize;

/// Separator placed between two messages in one coalesced outbound frame.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Byte substituted for every [`FRAME_DELIMITER`] found in an inbound payload.
pub const NEWLINE_REPLACEMENT: u8 = b' ';
