//! ---
//! vs_section: "02-dataflow"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Value pipeline: registry, stores, rounding, fan-out."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
//! Numeric telemetry flows `raw store -> rounder -> rounded store`. Every
//! stage implements [`ValueSink`] so additional consumers can be appended to
//! any store without touching the stages already wired.
#![warn(missing_docs)]

pub mod device;
pub mod filter;
pub mod pipeline;
pub mod rounder;
pub mod store;
pub mod subscription;
pub mod value;

/// Shared result type for dataflow operations.
pub type Result<T> = std::result::Result<T, DataflowError>;

/// Failures surfaced by the registry and stores.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataflowError {
    /// No device is registered under the given name.
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    /// A device with the same name already exists.
    #[error("device already registered: {0}")]
    DuplicateDevice(String),
}

/// Receiver side of a pipeline stage.
pub trait ValueSink: Send + Sync {
    /// Accept a value pushed by the upstream stage.
    fn accept(&self, value: value::Value);
}

pub use device::{Device, DeviceRegistry};
pub use filter::Filter;
pub use pipeline::Pipeline;
pub use rounder::{round_half_away_from_zero, Rounder, RounderStats};
pub use store::{StoreStats, ValueStore, DEFAULT_SUBSCRIPTION_CAPACITY};
pub use subscription::Subscription;
pub use value::{EssentialValue, Value, ValueKey, ValueMap};
