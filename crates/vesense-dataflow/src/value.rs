//! ---
//! vs_section: "02-dataflow"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Value pipeline: registry, stores, rounding, fan-out."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::device::Device;

/// Precision applied when a signal does not declare its own.
pub const DEFAULT_ROUND_DECIMALS: u32 = 2;

/// Identity of a current value inside a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueKey {
    /// Device name.
    pub device: String,
    /// Signal name.
    pub name: String,
}

impl ValueKey {
    /// Build a key from its parts.
    pub fn new(device: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            name: name.into(),
        }
    }
}

/// One numeric sample of a device signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    /// Device that produced the sample.
    pub device: Arc<Device>,
    /// Signal name, e.g. `MainVoltage`.
    pub name: String,
    /// Numeric magnitude.
    pub value: f64,
    /// Physical unit, informational only.
    pub unit: String,
    /// Decimal places the rounder quantizes to.
    pub round_decimals: u32,
    /// Time the sample was taken.
    pub timestamp: DateTime<Utc>,
}

impl Value {
    /// Create a value with no unit and the default precision.
    pub fn new(
        device: Arc<Device>,
        name: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            device,
            name: name.into(),
            value,
            unit: String::new(),
            round_decimals: DEFAULT_ROUND_DECIMALS,
            timestamp,
        }
    }

    /// Attach the physical unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Attach the rounding precision.
    pub fn with_round_decimals(mut self, decimals: u32) -> Self {
        self.round_decimals = decimals;
        self
    }

    /// Store key of this value.
    pub fn key(&self) -> ValueKey {
        ValueKey::new(self.device.name(), self.name.clone())
    }

    /// Reduced projection used for compact transport.
    pub fn essential(&self) -> EssentialValue {
        EssentialValue {
            device: self.device.name().to_owned(),
            name: self.name.clone(),
            value: self.value,
        }
    }
}

/// Device, signal and magnitude only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EssentialValue {
    /// Device name.
    pub device: String,
    /// Signal name.
    pub name: String,
    /// Numeric magnitude.
    pub value: f64,
}

/// Point-in-time copy of a store's current values, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueMap {
    values: BTreeMap<ValueKey, Value>,
}

impl ValueMap {
    pub(crate) fn from_map(values: BTreeMap<ValueKey, Value>) -> Self {
        Self { values }
    }

    /// Value currently held for `device` / `name`.
    pub fn get(&self, device: &str, name: &str) -> Option<&Value> {
        self.values.get(&ValueKey::new(device, name))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the snapshot holds nothing.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ValueKey, &Value)> {
        self.values.iter()
    }

    /// Reduced projection of every entry, in key order.
    pub fn essential_view(&self) -> Vec<EssentialValue> {
        self.values.values().map(Value::essential).collect()
    }
}

impl IntoIterator for ValueMap {
    type Item = (ValueKey, Value);
    type IntoIter = std::collections::btree_map::IntoIter<ValueKey, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}
