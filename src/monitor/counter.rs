//! Live count of chains still waiting for enough valid SCTs.

use std::sync::Arc;
use tokio::sync::watch;

/// Process-wide pending-verification counter.
///
/// Starts at zero, never goes below zero. Clones share the same count.
/// Observers get change notifications through [`subscribe`](Self::subscribe).
#[derive(Debug, Clone)]
pub struct PendingCounter {
    tx: Arc<watch::Sender<usize>>,
}

impl Default for PendingCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingCounter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> usize {
        *self.tx.borrow()
    }

    /// Returns the new value.
    pub fn increment(&self) -> usize {
        let mut value = 0;
        self.tx.send_modify(|count| {
            *count += 1;
            value = *count;
        });
        value
    }

    /// Returns the new value. A decrement at zero is a no-op.
    pub fn decrement(&self) -> usize {
        let mut value = 0;
        self.tx.send_if_modified(|count| {
            value = count.saturating_sub(1);
            let changed = value != *count;
            *count = value;
            changed
        });
        value
    }

    pub fn reset(&self) {
        self.tx.send_replace(0);
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }
}
