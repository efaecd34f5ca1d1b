//! The hub: single coordinator of membership and broadcast fan-out.
//!
//! [`Hub::run`] is the only code that ever touches the member map.  Every
//! other task talks to it through a cloneable [`HubHandle`], which feeds three
//! intake queues:
//!
//! ```text
//! register   (unbounded, acknowledged) ─┐
//! unregister (unbounded)                ├─► Hub::run ─► members ─► outbound queues
//! broadcast  (bounded backlog)         ─┘
//! ```
//!
//! Because the map has exactly one owner, no lock is needed.  Requests are
//! handled one at a time; `tokio::select!` picks fairly among the queues.
//!
//! # Backpressure
//!
//! Fan-out never waits on a member.  Each enqueue is a `try_send`; a member
//! whose queue is full is disconnected on the spot (its sender is dropped,
//! which closes the queue and makes its outbound pump close the connection).
//! One slow client therefore cannot stall delivery to everyone else.

use std::collections::HashMap;

use hub_core::{Message, SessionId};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

/// Error returned by [`HubHandle`] operations once the hub loop has stopped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("hub is no longer running")]
    Closed,
}

/// A registration request: the member id plus the producer end of its
/// outbound queue.  The hub becomes the queue's only producer.
#[derive(Debug)]
struct Registration {
    id: SessionId,
    outbound: mpsc::Sender<Message>,
    ack: oneshot::Sender<()>,
}

/// Cloneable entry point to a running [`Hub`].
#[derive(Debug, Clone)]
pub struct HubHandle {
    register_tx: mpsc::UnboundedSender<Registration>,
    unregister_tx: mpsc::UnboundedSender<SessionId>,
    broadcast_tx: mpsc::Sender<Message>,
    member_count: watch::Receiver<usize>,
}

impl HubHandle {
    /// Adds a member and waits until the hub has inserted it.
    ///
    /// Once this returns, every later broadcast reaches `outbound`.  The
    /// caller must not keep a clone of `outbound`: the hub closes the queue
    /// by dropping its sender.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub loop has stopped.
    pub async fn register(
        &self,
        id: SessionId,
        outbound: mpsc::Sender<Message>,
    ) -> Result<(), HubError> {
        let (ack, acked) = oneshot::channel();
        self.register_tx
            .send(Registration { id, outbound, ack })
            .map_err(|_| HubError::Closed)?;
        acked.await.map_err(|_| HubError::Closed)
    }

    /// Requests removal of a member.  Removing an absent member is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub loop has stopped.
    pub fn unregister(&self, id: SessionId) -> Result<(), HubError> {
        self.unregister_tx.send(id).map_err(|_| HubError::Closed)
    }

    /// Queues a message for fan-out to every member.
    ///
    /// Waits only for room in the hub's intake backlog, never for members.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub loop has stopped.
    pub async fn broadcast(&self, message: Message) -> Result<(), HubError> {
        self.broadcast_tx
            .send(message)
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Number of members as of the hub's last processed request.
    pub fn member_count(&self) -> usize {
        *self.member_count.borrow()
    }

    /// Waits until the member count equals `target`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub stops first.
    pub async fn wait_for_members(&self, target: usize) -> Result<(), HubError> {
        let mut rx = self.member_count.clone();
        rx.wait_for(|n| *n == target)
            .await
            .map_err(|_| HubError::Closed)?;
        Ok(())
    }
}

/// The coordination loop and the state it owns.
#[derive(Debug)]
pub struct Hub {
    members: HashMap<SessionId, mpsc::Sender<Message>>,
    register_rx: mpsc::UnboundedReceiver<Registration>,
    unregister_rx: mpsc::UnboundedReceiver<SessionId>,
    broadcast_rx: mpsc::Receiver<Message>,
    member_count: watch::Sender<usize>,
}

impl Hub {
    /// Creates a hub and its first handle.
    ///
    /// `broadcast_backlog` bounds the broadcast intake queue and must be
    /// non-zero.  The hub does nothing until [`Hub::run`] is spawned.
    pub fn new(broadcast_backlog: usize) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(broadcast_backlog);
        let (member_count, member_count_rx) = watch::channel(0);

        let hub = Self {
            members: HashMap::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            member_count,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            member_count: member_count_rx,
        };
        (hub, handle)
    }

    /// Runs the coordination loop until every [`HubHandle`] has been dropped.
    pub async fn run(mut self) {
        info!("hub coordination loop started");
        loop {
            tokio::select! {
                Some(registration) = self.register_rx.recv() => {
                    self.register(registration);
                }
                Some(id) = self.unregister_rx.recv() => {
                    self.unregister(id);
                }
                Some(message) = self.broadcast_rx.recv() => {
                    self.broadcast(message);
                }
                else => break,
            }
        }
        // Dropping the map closes every remaining outbound queue.
        let remaining = std::mem::take(&mut self.members);
        self.publish_count();
        drop(remaining);
        info!("hub coordination loop stopped");
    }

    fn register(&mut self, registration: Registration) {
        let Registration { id, outbound, ack } = registration;
        self.members.insert(id, outbound);
        self.publish_count();
        debug!("hub: session {id} registered ({} members)", self.members.len());
        // The session may have given up waiting; nothing to do then.
        let _ = ack.send(());
    }

    fn unregister(&mut self, id: SessionId) {
        // The count is published before the queue closes, so a session that
        // sees its queue end also sees itself gone from the count.
        if let Some(outbound) = self.members.remove(&id) {
            self.publish_count();
            drop(outbound);
            debug!("hub: session {id} unregistered ({} members)", self.members.len());
        }
    }

    fn broadcast(&mut self, message: Message) {
        let mut evicted = Vec::new();
        for (id, outbound) in &self.members {
            match outbound.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("hub: session {id} outbound queue full; disconnecting slow consumer");
                    evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("hub: session {id} outbound pump gone; removing");
                    evicted.push(*id);
                }
            }
        }
        if evicted.is_empty() {
            return;
        }
        let closed: Vec<_> = evicted
            .iter()
            .filter_map(|id| self.members.remove(id))
            .collect();
        self.publish_count();
        drop(closed);
    }

    fn publish_count(&self) {
        self.member_count.send_replace(self.members.len());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::time::timeout;
    use tokio_test::{assert_ready_ok, task};

    use super::*;

    const CAPACITY: usize = 256;

    fn spawn_hub() -> HubHandle {
        let (hub, handle) = Hub::new(64);
        tokio::spawn(hub.run());
        handle
    }

    async fn join(handle: &HubHandle, capacity: usize) -> (SessionId, mpsc::Receiver<Message>) {
        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(capacity);
        handle.register(id, tx).await.expect("hub running");
        (id, rx)
    }

    /// Sends a marker broadcast and waits for it at `rx`, which proves the hub
    /// has processed every request queued before it.
    async fn sync_through(handle: &HubHandle, rx: &mut mpsc::Receiver<Message>) {
        let marker = Message::from_static(b"__sync__");
        handle.broadcast(marker.clone()).await.unwrap();
        loop {
            let got = rx.recv().await.expect("queue open");
            if got == marker {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_register_is_visible_once_acknowledged() {
        // Arrange
        let handle = spawn_hub();

        // Act
        let (_id, _rx) = join(&handle, CAPACITY).await;

        // Assert
        assert_eq!(handle.member_count(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_member_exactly_once() {
        let handle = spawn_hub();
        let mut receivers = Vec::new();
        for _ in 0..5 {
            receivers.push(join(&handle, CAPACITY).await.1);
        }

        handle.broadcast(Message::from_static(b"hi")).await.unwrap();

        for rx in &mut receivers {
            let got = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
            assert_eq!(got, Some(Message::from_static(b"hi")));
            assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        }
    }

    #[tokio::test]
    async fn test_broadcast_preserves_order_per_member() {
        let handle = spawn_hub();
        let (_a, mut rx_a) = join(&handle, CAPACITY).await;
        let (_b, mut rx_b) = join(&handle, CAPACITY).await;

        for text in [&b"1"[..], b"2", b"3"] {
            handle
                .broadcast(Message::from_inbound(text, 512).unwrap())
                .await
                .unwrap();
        }

        for rx in [&mut rx_a, &mut rx_b] {
            for expected in [&b"1"[..], b"2", b"3"] {
                assert_eq!(rx.recv().await.unwrap().as_bytes(), expected);
            }
        }
    }

    #[tokio::test]
    async fn test_unregister_closes_outbound_queue() {
        let handle = spawn_hub();
        let (id, mut rx) = join(&handle, CAPACITY).await;

        handle.unregister(id).unwrap();

        let next = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(next, None, "queue must be closed");
        handle.wait_for_members(0).await.unwrap();
    }

    #[tokio::test]
    async fn test_unregister_twice_is_a_noop() {
        // Arrange: two members, remove one twice.
        let handle = spawn_hub();
        let (gone, mut gone_rx) = join(&handle, CAPACITY).await;
        let (_stays, mut stays_rx) = join(&handle, CAPACITY).await;

        // Act
        handle.unregister(gone).unwrap();
        handle.unregister(gone).unwrap();
        sync_through(&handle, &mut stays_rx).await;

        // Assert: the other member is untouched and the queue closed once.
        assert_eq!(handle.member_count(), 1);
        assert_eq!(gone_rx.recv().await, None);
        assert_eq!(gone_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_unregister_of_unknown_id_is_a_noop() {
        let handle = spawn_hub();
        let (_id, mut rx) = join(&handle, CAPACITY).await;

        handle.unregister(SessionId::new()).unwrap();
        sync_through(&handle, &mut rx).await;

        assert_eq!(handle.member_count(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_member_is_disconnected_on_next_broadcast() {
        // Arrange: one slow member filled to capacity, one healthy member
        // with room for everything.
        let handle = spawn_hub();
        let (_slow, mut slow_rx) = join(&handle, CAPACITY).await;
        let (_fast, mut fast_rx) = join(&handle, CAPACITY * 2).await;

        for i in 0..CAPACITY {
            let text = format!("msg {i}");
            handle
                .broadcast(Message::from_inbound(text.as_bytes(), 512).unwrap())
                .await
                .unwrap();
        }
        sync_through(&handle, &mut fast_rx).await;
        // The marker could not fit in the slow queue: it is already gone.
        handle.wait_for_members(1).await.unwrap();

        // Assert: the slow queue holds its 256 messages, then reports closed.
        let mut drained = 0;
        while let Some(_msg) = slow_rx.recv().await {
            drained += 1;
        }
        assert_eq!(drained, CAPACITY);

        // The healthy member keeps receiving.
        handle.broadcast(Message::from_static(b"after")).await.unwrap();
        let mut saw_after = false;
        while let Ok(Some(msg)) = timeout(Duration::from_millis(200), fast_rx.recv()).await {
            if msg.as_bytes() == b"after" {
                saw_after = true;
                break;
            }
        }
        assert!(saw_after);
    }

    #[tokio::test]
    async fn test_member_with_dropped_receiver_is_removed() {
        let handle = spawn_hub();
        let (_dead, dead_rx) = join(&handle, CAPACITY).await;
        let (_live, mut live_rx) = join(&handle, CAPACITY).await;
        drop(dead_rx);

        sync_through(&handle, &mut live_rx).await;

        assert_eq!(handle.member_count(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_does_not_wait_on_members() {
        // Arrange: many members that never drain, all already full.
        let handle = spawn_hub();
        let mut receivers = Vec::new();
        for _ in 0..100 {
            receivers.push(join(&handle, 1).await.1);
        }
        handle.broadcast(Message::from_static(b"fill")).await.unwrap();

        // Act: the next broadcast is accepted immediately and processed in
        // bounded time even though no member can take it.
        let msg = Message::from_static(b"overflow");
        let mut send = task::spawn(handle.broadcast(msg));
        assert_ready_ok!(send.poll());
        drop(send);

        // Assert
        timeout(Duration::from_secs(1), handle.wait_for_members(0))
            .await
            .expect("fan-out must not block")
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_overwrites_existing_id() {
        let handle = spawn_hub();
        let id = SessionId::new();
        let (old_tx, mut old_rx) = mpsc::channel(CAPACITY);
        let (new_tx, mut new_rx) = mpsc::channel(CAPACITY);

        handle.register(id, old_tx).await.unwrap();
        handle.register(id, new_tx).await.unwrap();
        handle.broadcast(Message::from_static(b"x")).await.unwrap();

        assert_eq!(handle.member_count(), 1);
        assert_eq!(new_rx.recv().await, Some(Message::from_static(b"x")));
        assert_eq!(old_rx.recv().await, None, "replaced sender was dropped");
    }

    #[tokio::test]
    async fn test_hub_stops_when_all_handles_dropped() {
        let (hub, handle) = Hub::new(8);
        let task = tokio::spawn(hub.run());

        drop(handle);

        timeout(Duration::from_secs(1), task)
            .await
            .expect("loop must exit")
            .unwrap();
    }

    #[tokio::test]
    async fn test_handle_reports_closed_after_hub_stops() {
        let (hub, handle) = Hub::new(8);
        drop(hub);

        assert_eq!(handle.unregister(SessionId::new()), Err(HubError::Closed));
        assert_eq!(
            handle.broadcast(Message::from_static(b"x")).await,
            Err(HubError::Closed)
        );
        let (tx, _rx) = mpsc::channel(1);
        assert_eq!(
            handle.register(SessionId::new(), tx).await,
            Err(HubError::Closed)
        );
    }
}
