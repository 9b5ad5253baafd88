//! ---
//! vs_section: "05-messaging"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Message-bus topics, payloads and publication."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use vesense_dataflow::Value;

/// Availability payload published on start.
pub const PAYLOAD_AVAILABLE: &str = "Online";
/// Availability payload published on shutdown.
pub const PAYLOAD_NOT_AVAILABLE: &str = "Offline";

/// JSON body of a realtime value message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RealtimePayload {
    /// Sample time.
    #[serde(serialize_with = "rfc3339")]
    pub time: DateTime<Utc>,
    /// Rounded magnitude.
    pub value: f64,
    /// Physical unit.
    pub unit: String,
}

fn rfc3339<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Secs, true))
}

impl From<&Value> for RealtimePayload {
    fn from(value: &Value) -> Self {
        Self {
            time: value.timestamp,
            value: value.value,
            unit: value.unit.clone(),
        }
    }
}

impl RealtimePayload {
    /// Encode as the JSON wire body.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
