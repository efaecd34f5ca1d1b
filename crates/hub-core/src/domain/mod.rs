//! Domain values shared by the hub and its sessions.
//!
//! Nothing in here performs I/O.  A [`message::Message`] is what the hub fans
//! out; a [`session_id::SessionId`] is how the hub tells members apart.

pub mod message;
pub mod session_id;
