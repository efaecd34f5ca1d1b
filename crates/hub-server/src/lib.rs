//! hub-server library crate.
//!
//! A WebSocket broadcast hub: every text message a client sends is
//! normalized and delivered to every connected client, the sender included.
//!
//! # Architecture
//!
//! ```text
//! WebSocket clients
//!         ↕
//! [hub-server]
//!   ├── domain/           HubConfig and its validation
//!   ├── application/
//!   │     ├── hub         single task owning the member map
//!   │     ├── session     inbound + outbound pump per connection
//!   │     └── connection  transport seam (reader half / writer half)
//!   └── infrastructure/
//!         ├── ws_server   accept loop and handshake (tokio-tungstenite)
//!         ├── ws_conn     tungstenite adapter for the transport seam
//!         ├── config_file TOML configuration
//!         └── memory_conn in-memory transport for tests
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain`, `hub-core` and `tokio` channels only;
//!   it never names a tungstenite type.
//! - `infrastructure` depends on all other layers.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: hub coordination and client sessions.
pub mod application;

/// Infrastructure layer: WebSocket server, transports and config file.
pub mod infrastructure;
