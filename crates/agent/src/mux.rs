//! Event multiplexer for concurrent delegations.
//!
//! One mpsc channel shared by all delegation producers, drained by the
//! planner. Per-producer order is preserved by the channel; cross-producer
//! interleaving is arrival order. Termination is sentinel-counted: the
//! drain stops once the expected number of `DelegationEnd` markers has
//! passed through, so the planner never depends on every producer handle
//! being dropped first.

use crate::event::AgentEvent;
use tokio::sync::mpsc;

pub struct EventMultiplexer {
    tx: mpsc::Sender<AgentEvent>,
    rx: mpsc::Receiver<AgentEvent>,
}

impl EventMultiplexer {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self { tx, rx }
    }

    /// A producer handle. Each delegation task gets its own clone.
    pub fn handle(&self) -> mpsc::Sender<AgentEvent> {
        self.tx.clone()
    }

    /// Drain the channel, re-emitting every event to `out` as it arrives,
    /// until `expected` `DelegationEnd` markers have been forwarded.
    ///
    /// Consumes the multiplexer so its own sender is dropped before the
    /// drain — the channel can then also close naturally if a producer
    /// dies without sending its sentinel.
    pub async fn forward_until_complete(self, out: &mpsc::Sender<AgentEvent>, expected: usize) {
        let Self { tx, mut rx } = self;
        drop(tx);

        let mut ended = 0;
        while ended < expected {
            let Some(event) = rx.recv().await else {
                break;
            };
            if matches!(event, AgentEvent::DelegationEnd { .. }) {
                ended += 1;
            }
            let _ = out.send(event).await;
        }
    }
}
