//! Application layer for hub-server.
//!
//! Coordination logic, independent of any concrete network library.
//!
//! # Responsibilities
//!
//! - Owning the membership set and fanning broadcasts out (`hub`)
//! - Running one inbound and one outbound pump per connection (`session`)
//! - Defining the transport seam both pumps talk to (`connection`)
//!
//! # What does NOT belong here?
//!
//! - Binding sockets or performing the WebSocket handshake (infrastructure)
//! - Tungstenite message types (hidden behind the `connection` traits)

pub mod connection;
pub mod hub;
pub mod session;

pub use connection::{Connection, ConnectionReader, ConnectionWriter, Inbound, TransportError};
pub use hub::{Hub, HubError, HubHandle};
pub use session::{ClientSession, SessionConfig, SessionError, SessionOutcome};
