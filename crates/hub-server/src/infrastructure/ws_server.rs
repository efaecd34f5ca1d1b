//! WebSocket server: accept loop and per-connection session tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Spawning the [`Hub`] coordination loop.
//! 3. Accepting incoming TCP connections.
//! 4. Upgrading each connection to a WebSocket, refusing any request whose
//!    path is not the configured endpoint.
//! 5. Starting a [`ClientSession`] for the upgraded connection and waiting for
//!    both of its pumps to finish.
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! Each connection runs in its own Tokio task; the accept loop never waits on
//! a handshake or a session.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, error, info, warn};

use crate::application::hub::{Hub, HubHandle};
use crate::application::session::{ClientSession, SessionConfig, SessionOutcome};
use crate::domain::HubConfig;
use crate::infrastructure::ws_conn::WsConnection;

/// How often the accept loop wakes up to check the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the hub and the WebSocket accept loop until `running` is set to
/// `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(config: HubConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.listen_addr))?;

    info!(
        "broadcast hub listening on ws://{}{}",
        config.listen_addr, config.endpoint_path
    );

    let (hub, handle) = Hub::new(config.broadcast_backlog);
    tokio::spawn(hub.run());

    serve_listener(listener, handle, Arc::new(config), running).await
}

/// Accepts connections on an already-bound `listener` and serves each one as
/// a hub session.  Returns once `running` is cleared.
///
/// Tests bind `127.0.0.1:0` themselves and hand the listener in here.
///
/// # Errors
///
/// Currently infallible once the listener is bound; accept errors are
/// logged and the loop continues.
pub async fn serve_listener(
    listener: TcpListener,
    hub: HubHandle,
    config: Arc<HubConfig>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        // ── Step 1: Check the shutdown flag ──────────────────────────────────
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // ── Step 2: Accept with a short timeout ──────────────────────────────
        // Short timeout so the flag is rechecked even when nobody connects.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                // ── Step 3: Hand the connection to its own task ──────────────
                // The handshake, the session and its teardown all run there;
                // the accept loop never waits on a client.
                debug!("new connection from {peer_addr}");
                let hub = hub.clone();
                let cfg = Arc::clone(&config);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, hub, cfg).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g., too many open file descriptors).
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Wraps [`run_connection`] and logs the outcome.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: HubHandle,
    config: Arc<HubConfig>,
) {
    match run_connection(stream, peer_addr, hub, config).await {
        Ok(outcome) => info!(
            "session {} from {peer_addr} ended (inbound: {}, outbound: {})",
            outcome.id,
            describe(&outcome.inbound),
            describe(&outcome.outbound)
        ),
        Err(e) => warn!("connection {peer_addr} dropped: {e:#}"),
    }
}

/// Upgrades `stream`, runs the session and waits for both pumps.
///
/// # Errors
///
/// Returns an error if the handshake fails (including a wrong path) or the
/// hub has stopped.
async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: HubHandle,
    config: Arc<HubConfig>,
) -> anyhow::Result<SessionOutcome> {
    let endpoint = config.endpoint_path.as_str();
    let ws_stream = accept_hdr_async_with_config(
        stream,
        |request: &Request, response: Response| check_endpoint(request, response, endpoint),
        Some(ws_config(&config)),
    )
    .await
    .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let session = ClientSession::start(
        WsConnection::new(ws_stream),
        hub.clone(),
        SessionConfig::from(config.as_ref()),
    )
    .await
    .with_context(|| format!("could not register {peer_addr} with the hub"))?;

    info!(
        "session {} connected from {peer_addr} ({} members)",
        session.id(),
        hub.member_count()
    );
    Ok(session.join().await)
}

/// Handshake callback: only the configured endpoint path is upgraded.
fn check_endpoint(
    request: &Request,
    response: Response,
    endpoint: &str,
) -> Result<Response, ErrorResponse> {
    let path = request.uri().path();
    if path == endpoint {
        return Ok(response);
    }
    debug!("refusing upgrade for path {path:?}");
    let mut rejection = ErrorResponse::new(Some(format!("no WebSocket endpoint at {path}")));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}

/// Transport limits derived from the hub configuration.
fn ws_config(config: &HubConfig) -> WebSocketConfig {
    let mut ws = WebSocketConfig::default();
    ws.max_message_size = Some(config.max_message_size);
    ws.max_frame_size = Some(config.max_message_size);
    ws
}

fn describe<E: std::fmt::Display>(result: &Result<(), E>) -> String {
    match result {
        Ok(()) => "ok".to_string(),
        Err(e) => e.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str) -> Request {
        Request::builder()
            .uri(path)
            .body(())
            .expect("valid request")
    }

    #[test]
    fn test_check_endpoint_accepts_configured_path() {
        let result = check_endpoint(&request("/ws"), Response::new(()), "/ws");
        assert!(result.is_ok());
    }

    #[test]
    fn test_check_endpoint_rejects_other_paths_with_404() {
        // Arrange / Act
        let result = check_endpoint(&request("/other"), Response::new(()), "/ws");

        // Assert
        let rejection = result.expect_err("must be refused");
        assert_eq!(rejection.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_check_endpoint_ignores_query_string() {
        let result = check_endpoint(&request("/ws?token=abc"), Response::new(()), "/ws");
        assert!(result.is_ok());
    }

    #[test]
    fn test_ws_config_applies_message_limit() {
        let cfg = HubConfig {
            max_message_size: 1024,
            ..HubConfig::default()
        };

        let ws = ws_config(&cfg);

        assert_eq!(ws.max_message_size, Some(1024));
        assert_eq!(ws.max_frame_size, Some(1024));
    }

    #[test]
    fn test_describe_formats_outcomes() {
        let ok: Result<(), String> = Ok(());
        let err: Result<(), String> = Err("boom".to_string());
        assert_eq!(describe(&ok), "ok");
        assert_eq!(describe(&err), "boom");
    }
}
