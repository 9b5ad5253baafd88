//! ---
//! vs_section: "05-messaging"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Message-bus topics, payloads and publication."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
//! Publication of rounded values onto a message bus. The broker client is a
//! [`BusTransport`]; this crate only decides topics, payloads and timing.
#![warn(missing_docs)]

pub mod hass;
pub mod payload;
pub mod publisher;
pub mod topic;
pub mod transport;

/// Shared result type for messaging operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Failures raised while publishing.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The transport refused or lost the message.
    #[error("transport {transport} failed: {reason}")]
    Transport {
        /// Transport name.
        transport: &'static str,
        /// Reason reported by the transport.
        reason: String,
    },
    /// Payload encoding failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Discovery document encoding failed.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub use hass::{hass_sensors, render_hass_yaml, HassSensor};
pub use payload::{RealtimePayload, PAYLOAD_AVAILABLE, PAYLOAD_NOT_AVAILABLE};
pub use publisher::{BusPublisher, PublisherStats};
pub use topic::{availability_topic, realtime_topic, render_topic, TopicContext};
pub use transport::{BusMessage, BusTransport, InMemoryTransport, LogTransport};
