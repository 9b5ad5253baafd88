//! ---
//! vs_section: "02-dataflow"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Value pipeline: registry, stores, rounding, fan-out."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

use crate::filter::Filter;
use crate::store::ValueStore;
use crate::value::Value;

struct Subscriber {
    filter: Filter,
    tx: mpsc::Sender<Value>,
}

/// Outcome of handing one value to every matching subscriber.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Delivery {
    pub delivered: u64,
    pub dropped: u64,
}

/// Live subscribers of one store. Lives under the store lock so that a
/// subscriber sees updates of one key in publish order.
#[derive(Default)]
pub(crate) struct FanOut {
    subscribers: HashMap<u64, Subscriber>,
    next_id: u64,
}

impl FanOut {
    pub fn register(&mut self, filter: Filter, capacity: usize) -> (u64, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.next_id += 1;
        let id = self.next_id;
        self.subscribers.insert(id, Subscriber { filter, tx });
        (id, rx)
    }

    pub fn remove(&mut self, id: u64) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Enqueue `value` for every subscriber whose filter admits its device.
    /// Full queues drop the update for that subscriber only; closed queues
    /// are deregistered on the spot.
    pub fn deliver(&mut self, value: &Value) -> Delivery {
        let mut outcome = Delivery::default();
        let mut closed = Vec::new();
        for (id, subscriber) in &self.subscribers {
            if !subscriber.filter.matches(&value.device) {
                continue;
            }
            match subscriber.tx.try_send(value.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    trace!(subscription = id, device = %value.device.name(), name = %value.name, "subscriber queue full; update dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        for id in closed {
            self.subscribers.remove(&id);
            debug!(subscription = id, "subscriber went away; deregistered");
        }
        outcome
    }
}

/// Handle to a live, filtered stream of future values of one store.
///
/// Dropping the handle deregisters it. The stream ends once the handle is
/// closed or the store shuts its subscriptions down.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Value>,
    store: Weak<ValueStore>,
    closed: bool,
}

impl Subscription {
    pub(crate) fn new(id: u64, rx: mpsc::Receiver<Value>, store: Weak<ValueStore>) -> Self {
        Self {
            id,
            rx,
            store,
            closed: false,
        }
    }

    /// Identifier unique within the owning store.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next matching value.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Take a queued value without waiting.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }

    /// Deregister from the store. Values already queued can still be drained.
    /// Calling this more than once is harmless.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
        self.rx.close();
    }
}

impl Stream for Subscription {
    type Item = Value;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish()
    }
}
