//! Inbound payload normalization.
//!
//! Every payload received from a client goes through [`normalize`] before the
//! hub fans it out:
//!
//! 1. Each [`FRAME_DELIMITER`] byte is replaced by [`NEWLINE_REPLACEMENT`].
//! 2. Leading and trailing whitespace is trimmed.  For valid UTF-8 that is
//!    every Unicode `White_Space` character (so U+00A0 and U+3000 too);
//!    otherwise the ASCII set including vertical tab.
//!
//! ```rust
//! use hub_core::normalize;
//!
//! assert_eq!(normalize(b"a\nb  "), b"a b".to_vec());
//! ```
//!
//! Trimming only cuts at character boundaries, so a valid UTF-8 payload stays
//! valid UTF-8.

use super::{FRAME_DELIMITER, NEWLINE_REPLACEMENT};

/// Returns the normalized form of `raw`.
///
/// Normalizing an already-normalized payload returns it unchanged.
pub fn normalize(raw: &[u8]) -> Vec<u8> {
    let trimmed = trim_whitespace(raw);
    // Delimiter and replacement are both whitespace, so trimming before
    // replacing gives the same result as the other order.
    trimmed
        .iter()
        .map(|&b| if b == FRAME_DELIMITER { NEWLINE_REPLACEMENT } else { b })
        .collect()
}

/// Returns `true` if `payload` contains no [`FRAME_DELIMITER`] and has no
/// leading or trailing whitespace.
pub fn is_normalized(payload: &[u8]) -> bool {
    !payload.contains(&FRAME_DELIMITER) && trim_whitespace(payload).len() == payload.len()
}

fn trim_whitespace(bytes: &[u8]) -> &[u8] {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.trim_matches(char::is_whitespace).as_bytes(),
        Err(_) => trim_ascii_whitespace(bytes),
    }
}

/// `u8::is_ascii_whitespace` leaves out vertical tab; it is trimmed here too.
fn is_ascii_space(b: u8) -> bool {
    b.is_ascii_whitespace() || b == 0x0b
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|&b| !is_ascii_space(b))
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|&b| !is_ascii_space(b))
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

// ── Tests ─────────────────────────────────────────────────────────────────────
