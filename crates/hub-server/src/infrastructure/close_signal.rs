//! Connection-wide close flag shared by a reader half and a writer half.
//!
//! Closing one half must wake a receive pending on the other half, so both
//! halves hold the same [`CloseSignal`].  The flag only ever goes from open to
//! closed.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct CloseSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CloseSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Marks the connection closed.  Closing twice is a no-op.
    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the connection is closed (immediately if it already is).
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}
