//! WebSocket broadcast hub: entry point.
//!
//! Accepts WebSocket connections on a single endpoint and relays every message
//! a client sends to all connected clients.
//!
//! # Usage
//!
//! ```text
//! hub-server [OPTIONS]
//!
//! Options:
//!   --addr <ADDR>              Listen address [default: 0.0.0.0:8080]
//!   --path <PATH>              WebSocket endpoint path [default: /ws]
//!   --pong-wait <SECS>         Idle deadline in seconds [default: 60]
//!   --write-wait <SECS>        Write deadline in seconds [default: 10]
//!   --max-message-size <BYTES> Largest accepted inbound message [default: 512]
//!   --queue-capacity <N>       Per-client outbound queue size [default: 256]
//!   --config <FILE>            TOML configuration file
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable               | Option               |
//! |------------------------|----------------------|
//! | `HUB_ADDR`             | `--addr`             |
//! | `HUB_PATH`             | `--path`             |
//! | `HUB_PONG_WAIT`        | `--pong-wait`        |
//! | `HUB_WRITE_WAIT`       | `--write-wait`       |
//! | `HUB_MAX_MESSAGE_SIZE` | `--max-message-size` |
//! | `HUB_QUEUE_CAPACITY`   | `--queue-capacity`   |
//! | `HUB_CONFIG`           | `--config`           |
//!
//! Precedence: command line / environment, then the config file, then the
//! built-in defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hub_server::domain::HubConfig;
use hub_server::infrastructure::{load_config_file, run_server};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket broadcast hub.
///
/// Every option is optional; unset options fall back to the config file and
/// then to the built-in defaults.
#[derive(Debug, Default, Parser)]
#[command(
    name = "hub-server",
    about = "WebSocket broadcast hub relaying every message to all clients",
    version
)]
struct Cli {
    /// Address the WebSocket listener binds to.
    #[arg(long, env = "HUB_ADDR")]
    addr: Option<SocketAddr>,

    /// HTTP path upgraded to a WebSocket; other paths get 404.
    #[arg(long, env = "HUB_PATH")]
    path: Option<String>,

    /// Seconds a connection may go without a pong before it is dropped.
    /// Pings are sent every nine tenths of this.
    #[arg(long, env = "HUB_PONG_WAIT")]
    pong_wait: Option<u64>,

    /// Seconds allowed for each outbound write.
    #[arg(long, env = "HUB_WRITE_WAIT")]
    write_wait: Option<u64>,

    /// Largest inbound message in bytes; larger messages close the connection.
    #[arg(long, env = "HUB_MAX_MESSAGE_SIZE")]
    max_message_size: Option<usize>,

    /// Outbound queue size per client; a client whose queue fills is dropped.
    #[arg(long, env = "HUB_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// TOML configuration file.
    #[arg(long, env = "HUB_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Builds the runtime configuration: file (or defaults), then overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if
    /// the resulting configuration is invalid.
    fn into_hub_config(self) -> anyhow::Result<HubConfig> {
        let base = match &self.config {
            Some(path) => load_config_file(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?
                .into_hub_config(),
            None => HubConfig::default(),
        };
        let config = self.apply_overrides(base);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply_overrides(self, mut config: HubConfig) -> HubConfig {
        if let Some(addr) = self.addr {
            config.listen_addr = addr;
        }
        if let Some(path) = self.path {
            config.endpoint_path = path;
        }
        if let Some(secs) = self.pong_wait {
            config.pong_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = self.write_wait {
            config.write_wait = Duration::from_secs(secs);
        }
        if let Some(size) = self.max_message_size {
            config.max_message_size = size;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        config
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. `tracing_subscriber` is initialised; `RUST_LOG` controls the level
///    (default `info`).
/// 2. CLI arguments and the optional config file are merged into a
///    [`HubConfig`].
/// 3. A Ctrl+C handler clears a shared `AtomicBool`.
/// 4. [`run_server`] runs the hub and the accept loop until the flag clears.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_hub_config()?;

    info!(
        "broadcast hub starting: addr={}, path={}, pong_wait={:?}, ping_period={:?}",
        config.listen_addr,
        config.endpoint_path,
        config.pong_wait,
        config.ping_period()
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    // The accept loop checks this flag every 200 ms.
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("broadcast hub stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_yield_default_config() {
        // Arrange: explicit empty CLI so environment variables cannot leak in
        let cli = Cli::default();

        // Act
        let config = cli.into_hub_config().unwrap();

        // Assert
        assert_eq!(config, HubConfig::default());
    }

    #[test]
    fn test_cli_parses_every_option() {
        let cli = Cli::parse_from([
            "hub-server",
            "--addr",
            "127.0.0.1:9001",
            "--path",
            "/live",
            "--pong-wait",
            "30",
            "--write-wait",
            "5",
            "--max-message-size",
            "1024",
            "--queue-capacity",
            "16",
        ]);

        let config = cli.into_hub_config().unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9001".parse().unwrap());
        assert_eq!(config.endpoint_path, "/live");
        assert_eq!(config.pong_wait, Duration::from_secs(30));
        assert_eq!(config.ping_period(), Duration::from_secs(27));
        assert_eq!(config.write_wait, Duration::from_secs(5));
        assert_eq!(config.max_message_size, 1024);
        assert_eq!(config.queue_capacity, 16);
    }

    #[test]
    fn test_cli_rejects_malformed_address() {
        let result = Cli::try_parse_from(["hub-server", "--addr", "not-an-addr"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_win_over_file_values() {
        // Arrange
        let base = HubConfig {
            endpoint_path: "/from-file".to_string(),
            queue_capacity: 8,
            ..HubConfig::default()
        };
        let cli = Cli {
            path: Some("/from-cli".to_string()),
            ..Cli::default()
        };

        // Act
        let config = cli.apply_overrides(base);

        // Assert: overridden field replaced, the rest kept from the file
        assert_eq!(config.endpoint_path, "/from-cli");
        assert_eq!(config.queue_capacity, 8);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = Cli {
            queue_capacity: Some(0),
            ..Cli::default()
        };
        assert!(cli.into_hub_config().is_err());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli {
            config: Some(std::env::temp_dir().join("hub-server-missing.toml")),
            ..Cli::default()
        };
        let err = cli.into_hub_config().unwrap_err();
        assert!(format!("{err:#}").contains("failed to load config file"));
    }

    #[test]
    fn test_overflowing_pong_wait_is_rejected() {
        let cli = Cli::parse_from(["hub-server", "--pong-wait", "3000000000000000000"]);
        let err = cli.into_hub_config().unwrap_err();
        assert!(format!("{err:#}").contains("exceeds the maximum"));
    }
}
