//! ---
//! vs_section: "02-dataflow"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Value pipeline: registry, stores, rounding, fan-out."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
//! Debounce stage between the raw and rounded stores.
//!
//! A value is forwarded when its key has never been forwarded, when its
//! rounded magnitude differs from the last forwarded one, or when the
//! heartbeat period has passed since the last forward for that key.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::warn;
use vesense_common::time::{elapsed_between, SharedClock};

use crate::value::{Value, ValueKey};
use crate::ValueSink;

/// Round `value` to `decimals` places, halves going away from zero.
pub fn round_half_away_from_zero(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals.min(15) as i32);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

#[derive(Debug, Clone, Copy)]
struct Forwarded {
    rounded: f64,
    at: DateTime<Utc>,
}

/// Forward/suppress counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RounderStats {
    /// Values passed downstream.
    pub forwarded: u64,
    /// Values swallowed by the debounce.
    pub suppressed: u64,
}

/// Quantizing debounce stage. Feed it from a store with [`crate::ValueStore::append`]
/// and append the downstream store to it.
pub struct Rounder {
    heartbeat: Duration,
    clock: SharedClock,
    last: Mutex<HashMap<ValueKey, Forwarded>>,
    sinks: RwLock<Vec<Arc<dyn ValueSink>>>,
    forwarded: AtomicU64,
    suppressed: AtomicU64,
}

impl Rounder {
    /// Create a rounder that re-forwards a stable signal at least every `heartbeat`.
    pub fn new(heartbeat: Duration, clock: SharedClock) -> Self {
        Self {
            heartbeat,
            clock,
            last: Mutex::new(HashMap::new()),
            sinks: RwLock::new(Vec::new()),
            forwarded: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Wire a downstream stage.
    pub fn append(&self, sink: Arc<dyn ValueSink>) {
        self.sinks.write().push(sink);
    }

    /// Counters for metrics export.
    pub fn stats(&self) -> RounderStats {
        RounderStats {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
        }
    }

    fn admit(&self, value: &Value) -> Option<f64> {
        let rounded = round_half_away_from_zero(value.value, value.round_decimals);
        let now = self.clock.now();
        let mut last = self.last.lock();
        let key = value.key();
        let forward = match last.get(&key) {
            None => true,
            Some(prev) => {
                prev.rounded != rounded || elapsed_between(prev.at, now) >= self.heartbeat
            }
        };
        if forward {
            last.insert(key, Forwarded { rounded, at: now });
            Some(rounded)
        } else {
            None
        }
    }
}

impl ValueSink for Rounder {
    fn accept(&self, value: Value) {
        if !value.value.is_finite() {
            warn!(device = %value.device.name(), name = %value.name, "non-finite value skipped");
            return;
        }
        let Some(rounded) = self.admit(&value) else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return;
        };
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        let out = Value {
            value: rounded,
            ..value
        };
        let sinks = self.sinks.read().clone();
        for sink in sinks {
            sink.accept(out.clone());
        }
    }
}

impl std::fmt::Debug for Rounder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rounder")
            .field("heartbeat", &self.heartbeat)
            .field("stats", &self.stats())
            .finish()
    }
}
