//! ---
//! vs_section: "01-core-functionality"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Shared primitives and utilities for the core runtime."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
//! Core shared primitives for the VE-Sense workspace.
//! This crate exposes configuration loading, logging bootstrap and the
//! injectable clock consumed by every pipeline stage.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, CameraConfig, DataflowConfig, DeviceConfig, FileStoreConfig, FtpServerConfig,
    HttpServerConfig, LoadedAppConfig, LoggingConfig, MetricsConfig, MqttConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use time::{Clock, ManualClock, SharedClock, SystemClock};
