//! ---
//! vs_section: "05-messaging"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Message-bus topics, payloads and publication."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
//! Home Assistant MQTT sensor discovery.
use std::sync::Arc;

use serde::Serialize;
use vesense_common::MqttConfig;
use vesense_dataflow::Device;
use vesense_devices::ModelRegistry;

use crate::payload::{PAYLOAD_AVAILABLE, PAYLOAD_NOT_AVAILABLE};
use crate::topic::{availability_topic, realtime_topic};

/// One `sensor` entry of the Home Assistant configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HassSensor {
    /// Always `mqtt`.
    pub platform: String,
    /// `<device>_<signal>` with dashes replaced by underscores.
    pub name: String,
    /// Realtime topic of the signal.
    pub state_topic: String,
    /// Daemon availability topic.
    pub availability_topic: String,
    /// Extracts the magnitude from the realtime payload.
    pub value_template: String,
    /// Physical unit.
    pub unit_of_measurement: String,
    /// Payload meaning "available".
    pub payload_available: String,
    /// Payload meaning "not available".
    pub payload_not_available: String,
}

fn hass_name(part: &str) -> String {
    part.replace('-', "_")
}

/// One sensor per signal of every device whose model is known.
pub fn hass_sensors(
    devices: &[Arc<Device>],
    models: &ModelRegistry,
    config: &MqttConfig,
) -> Vec<HassSensor> {
    let availability = availability_topic(config);
    let mut sensors = Vec::new();
    for device in devices {
        let Ok(model) = models.get(device.model()) else {
            continue;
        };
        for (value_name, register) in model.registers() {
            sensors.push(HassSensor {
                platform: "mqtt".to_owned(),
                name: format!("{}_{}", hass_name(device.name()), hass_name(value_name)),
                state_topic: realtime_topic(
                    config,
                    device.name(),
                    device.model(),
                    value_name,
                    register.unit,
                ),
                availability_topic: availability.clone(),
                value_template: "{{ value_json.Value }}".to_owned(),
                unit_of_measurement: register.unit.to_owned(),
                payload_available: PAYLOAD_AVAILABLE.to_owned(),
                payload_not_available: PAYLOAD_NOT_AVAILABLE.to_owned(),
            });
        }
    }
    sensors
}

/// YAML document listing `sensors`.
pub fn render_hass_yaml(sensors: &[HassSensor]) -> crate::Result<String> {
    Ok(serde_yaml::to_string(sensors)?)
}
