//! Integration tests for hub fan-out, backpressure and keepalive.
//!
//! Every test runs real [`ClientSession`]s against a real [`Hub`], with the
//! in-memory transport standing in for the network.  That keeps the tests
//! deterministic and lets the keepalive tests run on tokio's paused clock:
//! a minute of idle deadline takes no wall-clock time at all.
//!
//! ```text
//! MemoryPeer ─► MemoryConnection ─► ClientSession ─► Hub ─► every ClientSession ─► MemoryPeer
//! ```

use std::time::Duration;

use hub_server::application::hub::{Hub, HubHandle};
use hub_server::application::session::{ClientSession, SessionConfig, SessionError};
use hub_server::infrastructure::memory_conn::{memory_connection, MemoryPeer, Outbound};
use tokio::time::{timeout, Instant};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn config(queue_capacity: usize) -> SessionConfig {
    SessionConfig {
        queue_capacity,
        ..SessionConfig::default()
    }
}

fn spawn_hub() -> HubHandle {
    let (hub, handle) = Hub::new(1024);
    tokio::spawn(hub.run());
    handle
}

async fn connect(hub: &HubHandle, cfg: SessionConfig) -> (ClientSession, MemoryPeer) {
    let (conn, peer) = memory_connection();
    let session = ClientSession::start(conn, hub.clone(), cfg)
        .await
        .expect("hub running");
    (session, peer)
}

/// Reads frames until `count` messages have arrived, splitting coalesced
/// frames on the delimiter.
async fn collect_messages(peer: &mut MemoryPeer, count: usize) -> Vec<String> {
    let mut messages = Vec::new();
    while messages.len() < count {
        let frame = timeout(Duration::from_secs(5), peer.next_frame())
            .await
            .expect("frame within 5s")
            .expect("connection open");
        for part in hub_core::split_frame(&frame) {
            messages.push(String::from_utf8(part.to_vec()).expect("utf-8"));
        }
    }
    messages
}

// ── Fan-out ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_message_reaches_every_session_including_sender() {
    // Arrange
    let hub = spawn_hub();
    let mut sessions = Vec::new();
    let mut peers = Vec::new();
    for _ in 0..5 {
        let (session, peer) = connect(&hub, config(256)).await;
        sessions.push(session);
        peers.push(peer);
    }

    // Act
    peers[2].send_text("  hello\nworld  ");

    // Assert: exactly one normalized copy each
    for peer in &mut peers {
        assert_eq!(collect_messages(peer, 1).await, vec!["hello world"]);
        assert_eq!(peer.try_next_outbound(), None);
    }
}

#[tokio::test]
async fn test_messages_from_one_sender_arrive_in_order() {
    let hub = spawn_hub();
    let (_a, sender) = connect(&hub, config(256)).await;
    let (_b, mut receiver) = connect(&hub, config(256)).await;

    for i in 0..20 {
        sender.send_text(&format!("m{i}"));
    }

    let expected: Vec<String> = (0..20).map(|i| format!("m{i}")).collect();
    assert_eq!(collect_messages(&mut receiver, 20).await, expected);
}

// ── Backpressure ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_saturated_session_is_dropped_while_others_keep_receiving() {
    // Arrange: queue of 4; the slow peer never completes a write, so it holds
    // one message in flight plus four queued before it overflows.
    const CAPACITY: usize = 4;
    let hub = spawn_hub();
    let (_slow, slow_peer) = connect(&hub, config(CAPACITY)).await;
    slow_peer.stall_writes();
    let mut healthy = Vec::new();
    for _ in 0..3 {
        healthy.push(connect(&hub, config(CAPACITY)).await);
    }
    assert_eq!(hub.member_count(), 4);

    // Act: broadcast one message at a time, letting healthy peers drain.
    let total = CAPACITY + 4;
    for i in 0..total {
        healthy[0].1.send_text(&format!("n{i}"));
        for (_, peer) in &mut healthy {
            assert_eq!(collect_messages(peer, 1).await, vec![format!("n{i}")]);
        }
    }

    // Assert
    timeout(Duration::from_secs(1), hub.wait_for_members(3))
        .await
        .expect("slow member removed")
        .unwrap();
    for (_, peer) in &healthy {
        assert!(!peer.is_closed());
    }
}

#[tokio::test]
async fn test_peer_disconnect_removes_session_from_hub() {
    let hub = spawn_hub();
    let (session, peer) = connect(&hub, config(256)).await;
    let (_other, _other_peer) = connect(&hub, config(256)).await;

    peer.close_with(Some(1000));
    let outcome = session.join().await;

    assert!(outcome.inbound.is_ok());
    assert!(outcome.outbound.is_ok());
    assert_eq!(hub.member_count(), 1);
}

#[tokio::test]
async fn test_reset_connection_is_torn_down_quietly() {
    let hub = spawn_hub();
    let (session, peer) = connect(&hub, config(256)).await;

    peer.reset();
    let outcome = session.join().await;

    let err = outcome.inbound.unwrap_err();
    assert!(!err.is_unexpected(), "reset is routine: {err}");
    assert_eq!(hub.member_count(), 0);
}

// ── Keepalive ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_silent_peer_is_disconnected_after_pong_wait() {
    // Arrange
    let hub = spawn_hub();
    let start = Instant::now();
    let (session, mut peer) = connect(&hub, SessionConfig::default()).await;

    // Act
    let outcome = session.join().await;

    // Assert
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_secs(60) && elapsed < Duration::from_secs(61),
        "disconnected after {elapsed:?}"
    );
    assert!(matches!(
        outcome.inbound,
        Err(SessionError::IdleTimeout(d)) if d == Duration::from_secs(60)
    ));
    assert_eq!(hub.member_count(), 0);
    // One ping went out at 54 s before the deadline expired.
    assert_eq!(peer.next_outbound().await, Some(Outbound::Ping));
}

#[tokio::test(start_paused = true)]
async fn test_responsive_peer_stays_connected_indefinitely() {
    // Arrange
    let hub = spawn_hub();
    let (_session, mut peer) = connect(&hub, SessionConfig::default()).await;
    peer.auto_pong(true);

    // Act: ten minutes of virtual time
    tokio::time::sleep(Duration::from_secs(600)).await;

    // Assert: pings at 54 s, 108 s, ... 594 s and the session is still a member
    let mut pings = 0;
    while let Some(item) = peer.try_next_outbound() {
        assert_eq!(item, Outbound::Ping);
        pings += 1;
    }
    assert_eq!(pings, 11);
    assert!(!peer.is_closed());
    assert_eq!(hub.member_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_late_pong_still_resets_deadline() {
    // Arrange: no auto-pong; answer by hand just before each deadline
    let hub = spawn_hub();
    let (_session, peer) = connect(&hub, SessionConfig::default()).await;

    // Act
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(59)).await;
        peer.send_pong();
    }
    tokio::time::sleep(Duration::from_secs(30)).await;

    // Assert
    assert!(!peer.is_closed());
    assert_eq!(hub.member_count(), 1);
}

// ── Single writer ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_broadcasts_and_pings_never_overlap_on_a_connection() {
    // Arrange: a short ping period so pings interleave with broadcast traffic
    let hub = spawn_hub();
    let cfg = SessionConfig {
        pong_wait: Duration::from_millis(100),
        ping_period: Duration::from_millis(90),
        ..SessionConfig::default()
    };
    let mut peers = Vec::new();
    let mut sessions = Vec::new();
    for _ in 0..4 {
        let (session, peer) = connect(&hub, cfg).await;
        peer.auto_pong(true);
        sessions.push(session);
        peers.push(peer);
    }

    // Act: 100 messages from two senders, 5 ms apart
    for i in 0..100 {
        peers[i % 2].send_text(&format!("x{i}"));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Assert
    for peer in &mut peers {
        assert_eq!(collect_messages(peer, 100).await.len(), 100);
        assert_eq!(peer.overlapping_writes(), 0);
    }
    assert_eq!(hub.member_count(), 4);
}
