//! In-flight request tracking.

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::oneshot;

enum Slot {
    Waiting(oneshot::Sender<Bytes>),
    /// The caller stopped waiting. A late response is dropped, not
    /// treated as an inbound message.
    Abandoned,
}

/// What happened to a response handed to [`PendingRequests::complete`].
#[derive(Debug)]
pub enum Delivery {
    /// A waiting caller received it.
    Delivered,
    /// The request was abandoned; the response was dropped.
    Abandoned,
    /// No request with this sequence number is tracked.
    Unknown(Bytes),
}

/// Map of sequence number to the caller waiting for its response.
#[derive(Default)]
pub struct PendingRequests {
    slots: DashMap<u64, Slot>,
}

impl PendingRequests {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `seq` and return the receiver its response will arrive on.
    pub fn register(&self, seq: u64) -> oneshot::Receiver<Bytes> {
        let (tx, rx) = oneshot::channel();
        self.slots.insert(seq, Slot::Waiting(tx));
        rx
    }

    /// Route a response to whoever is waiting on `seq`.
    pub fn complete(&self, seq: u64, payload: Bytes) -> Delivery {
        match self.slots.remove(&seq) {
            Some((_, Slot::Waiting(tx))) => match tx.send(payload) {
                Ok(()) => Delivery::Delivered,
                // Receiver dropped between cancel and the guard running.
                Err(_) => Delivery::Abandoned,
            },
            Some((_, Slot::Abandoned)) => Delivery::Abandoned,
            None => Delivery::Unknown(payload),
        }
    }

    /// Mark `seq` as abandoned if it is still waiting.
    pub fn abandon(&self, seq: u64) {
        if let Some(mut slot) = self.slots.get_mut(&seq) {
            *slot = Slot::Abandoned;
        }
    }

    /// Drop every waiter so blocked callers observe a closed channel.
    pub fn fail_all(&self) {
        self.slots.clear();
    }

    /// Number of tracked sequence numbers, tombstones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("len", &self.slots.len())
            .finish()
    }
}
