//! ---
//! vs_section: "03-devices"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Device models, telemetry sources and polling."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
//! Model-specific register tables and the pollers that feed the raw store.
//!
//! Adding a device model is a data registration in [`ModelRegistry`]; the
//! poller and the downstream consumers only ever see signal names.

pub mod model;
pub mod poller;
pub mod source;
pub mod tables;

/// Failures resolving device models.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// The configured model tag has no registered table.
    #[error("unknown device model: {0}")]
    UnknownModel(String),
}

pub use model::{Model, ModelRegistry, RawRegister, Register};
pub use poller::{DevicePoller, PollStats, PollerGroup};
pub use source::{DummySource, RegisterReader, RegisterSource, TelemetrySource};
