//! ---
//! vs_section: "05-messaging"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Message-bus topics, payloads and publication."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use vesense_common::MqttConfig;

/// Values substituted into a topic template.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicContext<'a> {
    /// Replaces `%Prefix%`.
    pub prefix: &'a str,
    /// Replaces `%DeviceName%`.
    pub device_name: &'a str,
    /// Replaces `%DeviceModel%`.
    pub device_model: &'a str,
    /// Replaces `%ValueName%`.
    pub value_name: &'a str,
    /// Replaces `%ValueUnit%`.
    pub value_unit: &'a str,
}

/// Substitute every known placeholder in `template`. Unknown `%...%`
/// sequences are left alone.
pub fn render_topic(template: &str, ctx: &TopicContext<'_>) -> String {
    template
        .replace("%Prefix%", ctx.prefix)
        .replace("%DeviceName%", ctx.device_name)
        .replace("%DeviceModel%", ctx.device_model)
        .replace("%ValueName%", ctx.value_name)
        .replace("%ValueUnit%", ctx.value_unit)
}

/// Topic carrying the realtime value of one device signal.
pub fn realtime_topic(
    config: &MqttConfig,
    device_name: &str,
    device_model: &str,
    value_name: &str,
    value_unit: &str,
) -> String {
    render_topic(
        &config.realtime_topic,
        &TopicContext {
            prefix: &config.topic_prefix,
            device_name,
            device_model,
            value_name,
            value_unit,
        },
    )
}

/// Topic carrying the Online/Offline state of the daemon.
pub fn availability_topic(config: &MqttConfig) -> String {
    render_topic(
        &config.availability_topic,
        &TopicContext {
            prefix: &config.topic_prefix,
            ..TopicContext::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MqttConfig {
        let mut config = MqttConfig::new("tcp://broker:1883");
        config.topic_prefix = "piegn/".into();
        config
    }

    #[test]
    fn default_templates_render() {
        let config = config();
        assert_eq!(
            realtime_topic(&config, "24v-bmv", "bmv-702", "Current", "A"),
            "piegn/tele/ve/24v-bmv/Current"
        );
        assert_eq!(
            availability_topic(&config),
            "piegn/tele/software/vesense/LWT"
        );
    }

    #[test]
    fn every_placeholder_is_substituted() {
        let mut config = config();
        config.realtime_topic = "%Prefix%%DeviceModel%/%DeviceName%/%ValueName%[%ValueUnit%]/%Other%".into();
        assert_eq!(
            realtime_topic(&config, "bmv", "bmv-700", "Power", "W"),
            "piegn/bmv-700/bmv/Power[W]/%Other%"
        );
    }
}
