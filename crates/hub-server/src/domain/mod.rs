//! Domain layer for hub-server.
//!
//! Pure types with no I/O: the runtime configuration and its validation.
//! Message and session identity types live in `hub-core` and are re-exported
//! here for convenience.

pub mod config;

pub use config::{ConfigError, HubConfig};
pub use hub_core::{Message, SessionId};
