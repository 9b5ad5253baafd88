//! ---
//! vs_section: "02-dataflow"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Value pipeline: registry, stores, rounding, fan-out."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::sync::Arc;

use tracing::info;
use vesense_common::{DataflowConfig, SharedClock};

use crate::device::DeviceRegistry;
use crate::rounder::Rounder;
use crate::store::ValueStore;

/// Object graph built once at startup and handed to every component.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<DeviceRegistry>,
    raw: Arc<ValueStore>,
    rounder: Arc<Rounder>,
    rounded: Arc<ValueStore>,
    clock: SharedClock,
}

impl Pipeline {
    /// Wire `raw -> rounder -> rounded`.
    pub fn new(config: &DataflowConfig, clock: SharedClock) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let raw = Arc::new(ValueStore::new("raw", config.subscription_capacity));
        let rounder = Arc::new(Rounder::new(config.rounder_heartbeat, clock.clone()));
        let rounded = Arc::new(ValueStore::new("rounded", config.subscription_capacity));
        raw.append(rounder.clone());
        rounder.append(rounded.clone());
        info!(
            capacity = config.subscription_capacity,
            heartbeat_ms = config.rounder_heartbeat.as_millis() as u64,
            "dataflow pipeline wired"
        );
        Self {
            registry,
            raw,
            rounder,
            rounded,
            clock,
        }
    }

    /// Devices known to the process.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Store fed by the pollers.
    pub fn raw(&self) -> &Arc<ValueStore> {
        &self.raw
    }

    /// Debounce stage between the stores.
    pub fn rounder(&self) -> &Arc<Rounder> {
        &self.rounder
    }

    /// Store read by the REST, websocket and bus consumers.
    pub fn rounded(&self) -> &Arc<ValueStore> {
        &self.rounded
    }

    /// Clock used to stamp values.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// End every live subscription on both stores.
    pub fn shutdown(&self) {
        self.raw.close_subscriptions();
        self.rounded.close_subscriptions();
    }
}
