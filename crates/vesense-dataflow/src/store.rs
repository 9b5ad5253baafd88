//! ---
//! vs_section: "02-dataflow"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Value pipeline: registry, stores, rounding, fan-out."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::filter::Filter;
use crate::subscription::{FanOut, Subscription};
use crate::value::{Value, ValueKey, ValueMap};
use crate::ValueSink;

/// Queue depth per subscriber unless configured otherwise.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 32;

/// Counters describing a store, used by metrics and diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Distinct keys currently held.
    pub values: usize,
    /// Live subscriptions.
    pub subscriptions: usize,
    /// Total publishes accepted.
    pub published: u64,
    /// Updates enqueued to subscribers.
    pub delivered: u64,
    /// Updates dropped because a subscriber queue was full.
    pub dropped: u64,
}

struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self {
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }
}

#[derive(Default)]
struct State {
    values: HashMap<ValueKey, Value>,
    fan_out: FanOut,
}

/// Latest value per (device, signal) plus the live subscriptions on it.
pub struct ValueStore {
    label: String,
    capacity: usize,
    state: Mutex<State>,
    sinks: RwLock<Vec<Arc<dyn ValueSink>>>,
    counters: Counters,
}

impl ValueStore {
    /// Create a store whose subscribers get `capacity` queued updates each.
    pub fn new(label: impl Into<String>, capacity: usize) -> Self {
        Self {
            label: label.into(),
            capacity: capacity.max(1),
            state: Mutex::new(State::default()),
            sinks: RwLock::new(Vec::new()),
            counters: Counters::new(),
        }
    }

    /// Name used in logs (`raw`, `rounded`, ...).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Replace the current value for the key and notify matching subscribers,
    /// then forward the value to every appended stage.
    pub fn publish(&self, value: Value) {
        let delivery = {
            let mut state = self.state.lock();
            state.values.insert(value.key(), value.clone());
            state.fan_out.deliver(&value)
        };
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        self.counters
            .delivered
            .fetch_add(delivery.delivered, Ordering::Relaxed);
        self.counters
            .dropped
            .fetch_add(delivery.dropped, Ordering::Relaxed);

        let sinks = self.sinks.read().clone();
        for sink in sinks {
            sink.accept(value.clone());
        }
    }

    /// Current values of every device admitted by `filter`.
    pub fn snapshot(&self, filter: &Filter) -> ValueMap {
        let state = self.state.lock();
        let values: BTreeMap<ValueKey, Value> = state
            .values
            .iter()
            .filter(|(_, value)| filter.matches(&value.device))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        ValueMap::from_map(values)
    }

    /// Register a live subscription. Only values published afterwards are delivered.
    pub fn subscribe(self: &Arc<Self>, filter: Filter) -> Subscription {
        let (id, rx) = self.state.lock().fan_out.register(filter, self.capacity);
        debug!(store = %self.label, subscription = id, "subscription registered");
        Subscription::new(id, rx, Arc::downgrade(self))
    }

    /// Wire another stage to receive every value published here.
    pub fn append(&self, sink: Arc<dyn ValueSink>) {
        self.sinks.write().push(sink);
    }

    /// End every live subscription stream; used during shutdown.
    pub fn close_subscriptions(&self) {
        let mut state = self.state.lock();
        let count = state.fan_out.len();
        state.fan_out.clear();
        debug!(store = %self.label, count, "subscriptions closed");
    }

    pub(crate) fn unsubscribe(&self, id: u64) {
        if self.state.lock().fan_out.remove(id) {
            debug!(store = %self.label, subscription = id, "subscription deregistered");
        }
    }

    /// Counters for metrics export.
    pub fn stats(&self) -> StoreStats {
        let state = self.state.lock();
        StoreStats {
            values: state.values.len(),
            subscriptions: state.fan_out.len(),
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

impl ValueSink for ValueStore {
    fn accept(&self, value: Value) {
        self.publish(value);
    }
}

impl std::fmt::Debug for ValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueStore")
            .field("label", &self.label)
            .field("capacity", &self.capacity)
            .finish()
    }
}
