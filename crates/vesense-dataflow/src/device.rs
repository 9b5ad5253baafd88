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

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::{DataflowError, Result};

/// A battery monitor or camera known to the process.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Device {
    name: String,
    model: String,
    frontend_config: serde_json::Value,
}

impl Device {
    /// Stable unique name, used as key everywhere.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Model tag selecting the signal table.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Opaque blob handed to the dashboard.
    pub fn frontend_config(&self) -> &serde_json::Value {
        &self.frontend_config
    }
}

/// Process-wide table of devices, populated at startup and never shrunk.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<IndexMap<String, Arc<Device>>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device. Names are unique for the process lifetime.
    pub fn create(
        &self,
        name: impl Into<String>,
        model: impl Into<String>,
        frontend_config: serde_json::Value,
    ) -> Result<Arc<Device>> {
        let name = name.into();
        let mut devices = self.devices.write();
        if devices.contains_key(&name) {
            return Err(DataflowError::DuplicateDevice(name));
        }
        let device = Arc::new(Device {
            name: name.clone(),
            model: model.into(),
            frontend_config,
        });
        debug!(device = %device.name, model = %device.model, "device registered");
        devices.insert(name, device.clone());
        Ok(device)
    }

    /// Look up a device by name.
    pub fn get_by_name(&self, name: &str) -> Result<Arc<Device>> {
        self.devices
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DataflowError::DeviceNotFound(name.to_owned()))
    }

    /// All devices in creation order.
    pub fn get_all(&self) -> Vec<Arc<Device>> {
        self.devices.read().values().cloned().collect()
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// True when nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}
