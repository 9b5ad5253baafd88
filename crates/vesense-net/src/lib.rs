//! ---
//! vs_section: "07-networking-external-interfaces"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "REST snapshot API and live websocket stream."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
//! HTTP surface of the daemon. Routes read from the rounded store, the
//! device registry and the virtual file store; nothing here mutates them.
#![warn(missing_docs)]

pub mod error;
pub mod picture;
pub mod rest;
pub mod websocket;

pub use error::ApiError;
pub use rest::{ApiServerBuilder, ApiServerHandle};
pub use websocket::LiveValue;
