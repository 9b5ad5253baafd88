//! ---
//! vs_section: "01-core-functionality"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Daemon library: pipeline wiring shared by the binary and integration tests."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
pub mod daemon;

pub use daemon::{
    DaemonBuilder, DaemonHandle, NoSerialDriver, ReaderFactory, CAMERA_MODEL,
};
