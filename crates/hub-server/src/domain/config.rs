//! Hub configuration types.
//!
//! [`HubConfig`] is the single source of truth for all runtime settings.  It
//! is built once at startup from defaults, an optional TOML file and CLI
//! arguments (in increasing precedence), then shared read-only by the accept
//! loop and every session.
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! reads in here) lets tests construct exactly the timings they need.

use std::net::SocketAddr;
use std::time::Duration;

use hub_core::DEFAULT_MAX_MESSAGE_SIZE;
use thiserror::Error;

/// Pings leave one tenth of the idle deadline as slack: they are sent every
/// nine tenths of it.
const PING_SLACK_DIVISOR: u32 = 10;

/// Longest accepted idle deadline.  Deadlines are added to `Instant::now()`,
/// which must not overflow.
pub const MAX_PONG_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Error returned by [`HubConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("endpoint path must start with '/': {0:?}")]
    InvalidEndpointPath(String),
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("pong wait of {0:?} is too short to derive a ping period")]
    PongWaitTooShort(Duration),
    #[error("pong wait of {0:?} exceeds the maximum of {max:?}", max = MAX_PONG_WAIT)]
    PongWaitTooLong(Duration),
}

/// All runtime configuration for the broadcast hub.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use hub_server::domain::HubConfig;
///
/// let cfg = HubConfig::default();
/// assert_eq!(cfg.listen_addr.port(), 8080);
/// assert_eq!(cfg.ping_period(), Duration::from_secs(54));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Address the WebSocket listener binds to.
    pub listen_addr: SocketAddr,

    /// The single HTTP path that is upgraded to a WebSocket.  Requests for any
    /// other path are refused during the handshake.
    pub endpoint_path: String,

    /// Idle deadline: how long a connection may go without a pong before it is
    /// considered dead.
    pub pong_wait: Duration,

    /// Deadline applied to every outbound write (frames, pings, close).
    pub write_wait: Duration,

    /// Largest inbound message accepted from a client, in bytes.
    pub max_message_size: usize,

    /// Capacity of each session's outbound queue.  A member whose queue is
    /// full when the hub broadcasts is disconnected.
    pub queue_capacity: usize,

    /// Capacity of the hub's broadcast intake queue.
    pub broadcast_backlog: usize,
}

impl HubConfig {
    /// Keepalive ping interval: nine tenths of
    /// [`pong_wait`](Self::pong_wait), rounded up to the nanosecond.
    ///
    /// Computed by subtraction so it cannot overflow for any `pong_wait`;
    /// [`validate`](Self::validate) checks it is strictly shorter.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait - self.pong_wait / PING_SLACK_DIVISOR
    }

    /// Checks the invariants the hub and sessions rely on.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.endpoint_path.starts_with('/') {
            return Err(ConfigError::InvalidEndpointPath(self.endpoint_path.clone()));
        }
        if self.write_wait.is_zero() {
            return Err(ConfigError::Zero {
                field: "write_wait",
            });
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Zero {
                field: "max_message_size",
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "queue_capacity",
            });
        }
        if self.broadcast_backlog == 0 {
            return Err(ConfigError::Zero {
                field: "broadcast_backlog",
            });
        }
        if self.pong_wait > MAX_PONG_WAIT {
            return Err(ConfigError::PongWaitTooLong(self.pong_wait));
        }
        let ping = self.ping_period();
        if ping.is_zero() || ping >= self.pong_wait {
            return Err(ConfigError::PongWaitTooShort(self.pong_wait));
        }
        Ok(())
    }
}

impl Default for HubConfig {
    /// | Field              | Default         |
    /// |--------------------|-----------------|
    /// | listen_addr        | `0.0.0.0:8080`  |
    /// | endpoint_path      | `/ws`           |
    /// | pong_wait          | 60 seconds      |
    /// | write_wait         | 10 seconds      |
    /// | max_message_size   | 512 bytes       |
    /// | queue_capacity     | 256 messages    |
    /// | broadcast_backlog  | 1024 messages   |
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            endpoint_path: "/ws".to_string(),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            queue_capacity: 256,
            broadcast_backlog: 1024,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
