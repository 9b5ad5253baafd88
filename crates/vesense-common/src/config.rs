//! ---
//! vs_section: "01-core-functionality"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Shared primitives and utilities for the core runtime."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

/// Device path that selects the synthetic telemetry source.
pub const DUMMY_DEVICE: &str = "dummy";

fn default_poll_interval() -> Duration {
    Duration::from_millis(400)
}

fn default_subscription_capacity() -> usize {
    32
}

fn default_rounder_heartbeat() -> Duration {
    Duration::from_secs(5)
}

fn default_retain_per_directory() -> usize {
    5
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_http_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_ftp_bind() -> String {
    "0.0.0.0".to_owned()
}

fn default_ftp_port() -> u16 {
    2121
}

fn default_passive_port_start() -> u16 {
    2122
}

fn default_passive_port_end() -> u16 {
    2200
}

fn default_client_id() -> String {
    "vesense".to_owned()
}

fn default_availability_topic() -> String {
    "%Prefix%tele/software/vesense/LWT".to_owned()
}

fn default_realtime_topic() -> String {
    "%Prefix%tele/ve/%DeviceName%/%ValueName%".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_qos() -> u8 {
    1
}

/// Primary configuration object for the VE-Sense daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub devices: IndexMap<String, DeviceConfig>,
    #[serde(default)]
    pub cameras: IndexMap<String, CameraConfig>,
    #[serde(default)]
    pub ftp_server: Option<FtpServerConfig>,
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,
    #[serde(default)]
    pub http_server: Option<HttpServerConfig>,
    #[serde(default)]
    pub dataflow: DataflowConfig,
    #[serde(default)]
    pub file_store: FileStoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "VESENSE_CONFIG";

    /// Load configuration from disk, respecting the `VESENSE_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants. Any failure here is fatal for the daemon.
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() && self.cameras.is_empty() {
            return Err(anyhow!(
                "configuration must declare at least one device or camera"
            ));
        }

        let mut names = HashSet::new();
        for name in self.devices.keys().chain(self.cameras.keys()) {
            if name.trim().is_empty() {
                return Err(anyhow!("device and camera names must not be empty"));
            }
            if !names.insert(name.as_str()) {
                return Err(anyhow!(
                    "name '{}' is used by more than one device or camera",
                    name
                ));
            }
        }

        for (name, device) in &self.devices {
            device.validate(name)?;
        }
        for (name, camera) in &self.cameras {
            camera.validate(name)?;
        }
        if let Some(ftp) = &self.ftp_server {
            ftp.validate()?;
        }
        self.dataflow.validate()?;
        self.file_store.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// A battery monitor polled over its serial link.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub model: String,
    pub device: String,
    #[serde(default)]
    pub debug_print: bool,
    #[serde(default = "default_poll_interval", rename = "poll_interval_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
    #[serde(default)]
    pub frontend_config: serde_json::Value,
}

impl DeviceConfig {
    pub fn is_dummy(&self) -> bool {
        self.device == DUMMY_DEVICE
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("device '{}' must declare a model", name));
        }
        if self.device.trim().is_empty() {
            return Err(anyhow!("device '{}' must declare a device path", name));
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!("device '{}' poll interval must be non-zero", name));
        }
        Ok(())
    }
}

/// A camera uploading pictures through the file-transfer server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub user: String,
    pub password: String,
    #[serde(default)]
    pub frontend_config: serde_json::Value,
}

impl CameraConfig {
    fn validate(&self, name: &str) -> Result<()> {
        if self.user.is_empty() || self.password.is_empty() {
            return Err(anyhow!("camera '{}' must declare user and password", name));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpServerConfig {
    #[serde(default = "default_ftp_bind")]
    pub bind: String,
    #[serde(default = "default_ftp_port")]
    pub port: u16,
    #[serde(default = "default_passive_port_start")]
    pub passive_port_start: u16,
    #[serde(default = "default_passive_port_end")]
    pub passive_port_end: u16,
}

impl FtpServerConfig {
    fn validate(&self) -> Result<()> {
        if self.passive_port_start > self.passive_port_end {
            return Err(anyhow!(
                "ftp passive port range {}-{} is inverted",
                self.passive_port_start,
                self.passive_port_end
            ));
        }
        Ok(())
    }
}

impl Default for FtpServerConfig {
    fn default() -> Self {
        Self {
            bind: default_ftp_bind(),
            port: default_ftp_port(),
            passive_port_start: default_passive_port_start(),
            passive_port_end: default_passive_port_end(),
        }
    }
}

/// Broker connection and topic layout for message-bus publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub topic_prefix: String,
    #[serde(default = "default_availability_topic")]
    pub availability_topic: String,
    #[serde(default = "default_realtime_topic")]
    pub realtime_topic: String,
    #[serde(default = "default_true")]
    pub realtime_enabled: bool,
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
}

impl MqttConfig {
    /// Minimal configuration pointing at `broker` with default topics.
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            client_id: default_client_id(),
            user: None,
            password: None,
            topic_prefix: String::new(),
            availability_topic: default_availability_topic(),
            realtime_topic: default_realtime_topic(),
            realtime_enabled: true,
            qos: default_qos(),
            retain: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_listen")]
    pub listen: SocketAddr,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen: default_http_listen(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataflowConfig {
    #[serde(default = "default_subscription_capacity")]
    pub subscription_capacity: usize,
    #[serde(default = "default_rounder_heartbeat", rename = "rounder_heartbeat_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub rounder_heartbeat: Duration,
}

impl DataflowConfig {
    fn validate(&self) -> Result<()> {
        if self.subscription_capacity == 0 {
            return Err(anyhow!("dataflow.subscription_capacity must be positive"));
        }
        if self.rounder_heartbeat.is_zero() {
            return Err(anyhow!("dataflow.rounder_heartbeat_ms must be positive"));
        }
        Ok(())
    }
}

impl Default for DataflowConfig {
    fn default() -> Self {
        Self {
            subscription_capacity: default_subscription_capacity(),
            rounder_heartbeat: default_rounder_heartbeat(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreConfig {
    #[serde(default = "default_retain_per_directory")]
    pub retain_per_directory: usize,
}

impl FileStoreConfig {
    fn validate(&self) -> Result<()> {
        if self.retain_per_directory == 0 {
            return Err(anyhow!("file_store.retain_per_directory must be positive"));
        }
        Ok(())
    }
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            retain_per_directory: default_retain_per_directory(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[devices.24v-bmv]
model = "bmv-702"
device = "/dev/ttyUSB0"
frontend_config = { color = "red" }

[devices.dummy-bmv]
model = "bmv-700"
device = "dummy"
poll_interval_ms = 1000

[cameras.cam1]
user = "cam1"
password = "secret"

[mqtt]
broker = "tcp://localhost:1883"
topic_prefix = "piegn/"

[http_server]
listen = "127.0.0.1:8001"
"#;

    #[test]
    fn sample_config_parses_with_defaults() {
        let config: AppConfig = SAMPLE.parse().expect("sample config");
        assert_eq!(
            config.devices.keys().collect::<Vec<_>>(),
            vec!["24v-bmv", "dummy-bmv"]
        );
        let bmv = &config.devices["24v-bmv"];
        assert_eq!(bmv.poll_interval, Duration::from_millis(400));
        assert_eq!(bmv.frontend_config["color"], "red");
        assert!(config.devices["dummy-bmv"].is_dummy());
        assert_eq!(
            config.devices["dummy-bmv"].poll_interval,
            Duration::from_secs(1)
        );

        let mqtt = config.mqtt.expect("mqtt section");
        assert_eq!(mqtt.topic_prefix, "piegn/");
        assert_eq!(mqtt.realtime_topic, default_realtime_topic());
        assert!(config.ftp_server.is_none());
        assert_eq!(config.dataflow.subscription_capacity, 32);
        assert_eq!(config.file_store.retain_per_directory, 5);
        assert_eq!(
            config.http_server.expect("http").listen,
            "127.0.0.1:8001".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn duplicate_names_across_tables_are_rejected() {
        let content = r#"
[devices.shared]
model = "bmv-700"
device = "dummy"

[cameras.shared]
user = "u"
password = "p"
"#;
        let err = content.parse::<AppConfig>().expect_err("duplicate name");
        assert!(err.to_string().contains("more than one"));
    }

    #[test]
    fn empty_configuration_is_rejected() {
        let err = "".parse::<AppConfig>().expect_err("empty config");
        assert!(err.to_string().contains("at least one device or camera"));
    }

    #[test]
    fn zero_retention_is_rejected() {
        let content = r#"
[cameras.cam]
user = "u"
password = "p"

[file_store]
retain_per_directory = 0
"#;
        assert!(content.parse::<AppConfig>().is_err());
    }

    #[test]
    fn load_with_source_picks_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vesense.toml");
        fs::write(&path, SAMPLE).unwrap();
        let missing = dir.path().join("missing.toml");

        let loaded = AppConfig::load_with_source(&[missing, path.clone()]).unwrap();
        assert_eq!(loaded.source, path);
        assert_eq!(loaded.config.cameras.len(), 1);
    }
}
