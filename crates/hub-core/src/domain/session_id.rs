//! Opaque identity of one connected client.

use std::fmt;

use uuid::Uuid;

/// Identifies one client session for membership purposes only.
///
/// Ids are never used to address or route messages; the hub keys its member
/// map by them so that registering and unregistering are exact operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The short form keeps log lines readable; collisions in the first
        // eight hex digits are harmless for diagnostics.
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}
