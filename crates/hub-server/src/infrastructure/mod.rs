//! Infrastructure layer for hub-server.
//!
//! Everything that touches the outside world:
//!
//! - Binding the TCP listener and running the accept loop (`ws_server`)
//! - Adapting upgraded `tokio-tungstenite` streams to the transport seam
//!   (`ws_conn`)
//! - Reading the optional TOML configuration file (`config_file`)
//! - An in-memory transport for tests (`memory_conn`)

pub mod close_signal;
pub mod config_file;
pub mod memory_conn;
pub mod ws_conn;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use config_file::{load_config_file, ConfigFileError, FileConfig};
pub use ws_server::{run_server, serve_listener};
