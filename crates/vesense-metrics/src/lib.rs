//! ---
//! vs_section: "06-observability"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Metrics collection and export utilities."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use prometheus::{
    GaugeVec, Histogram, HistogramOpts, IntCounter, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tracing::error;
use vesense_dataflow::{RounderStats, StoreStats};
use vesense_vfs::FileStoreStats;

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Prometheus scrape endpoint. Returns `text/plain` metrics even on large registries.
pub async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone, Debug)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "vesensed_starts_total",
            "Total number of times the VE-Sense daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "vesensed_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new(
                "vesensed_build_info",
                "Build metadata for the running daemon binary",
            ),
            &["version", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
            build_info,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn set_build_info(&self, version: &str, profile: &str) {
        self.build_info
            .with_label_values(&[version, profile])
            .set(1.0);
    }
}

/// Pipeline and file store gauges, refreshed from component statistics.
#[derive(Clone, Debug)]
pub struct PipelineMetrics {
    registry: SharedRegistry,
    devices: IntGauge,
    values_published: IntGaugeVec,
    deliveries: IntGaugeVec,
    deliveries_dropped: IntGaugeVec,
    subscriptions: IntGaugeVec,
    rounder: IntGaugeVec,
    files_stored: IntGauge,
    file_bytes: IntGauge,
    files_evicted: IntGauge,
    uploads_committed: IntGauge,
    poll_failures: IntGaugeVec,
    bus_messages: IntGaugeVec,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<IntGaugeVec> {
    let gauge = IntGaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl PipelineMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        Ok(Self {
            devices: gauge(&registry, "vesense_devices", "Number of registered devices")?,
            values_published: gauge_vec(
                &registry,
                "vesense_values_published",
                "Values published into a store since start",
                &["store"],
            )?,
            deliveries: gauge_vec(
                &registry,
                "vesense_deliveries",
                "Updates enqueued to subscribers since start",
                &["store"],
            )?,
            deliveries_dropped: gauge_vec(
                &registry,
                "vesense_deliveries_dropped",
                "Updates dropped because a subscriber queue was full",
                &["store"],
            )?,
            subscriptions: gauge_vec(
                &registry,
                "vesense_subscriptions_active",
                "Live subscriptions per store",
                &["store"],
            )?,
            rounder: gauge_vec(
                &registry,
                "vesense_rounder_values",
                "Values forwarded or suppressed by the rounder",
                &["outcome"],
            )?,
            files_stored: gauge(&registry, "vesense_files_stored", "Committed files held in memory")?,
            file_bytes: gauge(&registry, "vesense_file_bytes", "Payload bytes held by the file store")?,
            files_evicted: gauge(
                &registry,
                "vesense_files_evicted",
                "Files evicted by retention since start",
            )?,
            uploads_committed: gauge(
                &registry,
                "vesense_uploads_committed",
                "Uploads committed since start",
            )?,
            poll_failures: gauge_vec(
                &registry,
                "vesense_poll_failures",
                "Failed telemetry polls per device",
                &["device"],
            )?,
            bus_messages: gauge_vec(
                &registry,
                "vesense_bus_messages",
                "Message-bus publishes by outcome",
                &["outcome"],
            )?,
            registry,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn set_device_count(&self, count: usize) {
        self.devices.set(count as i64);
    }

    pub fn observe_store(&self, label: &str, stats: &StoreStats) {
        self.values_published
            .with_label_values(&[label])
            .set(clamp(stats.published));
        self.deliveries
            .with_label_values(&[label])
            .set(clamp(stats.delivered));
        self.deliveries_dropped
            .with_label_values(&[label])
            .set(clamp(stats.dropped));
        self.subscriptions
            .with_label_values(&[label])
            .set(stats.subscriptions as i64);
    }

    pub fn observe_rounder(&self, stats: &RounderStats) {
        self.rounder
            .with_label_values(&["forwarded"])
            .set(clamp(stats.forwarded));
        self.rounder
            .with_label_values(&["suppressed"])
            .set(clamp(stats.suppressed));
    }

    pub fn observe_file_store(&self, stats: &FileStoreStats) {
        self.files_stored.set(stats.files as i64);
        self.file_bytes.set(clamp(stats.bytes));
        self.files_evicted.set(clamp(stats.evicted));
        self.uploads_committed.set(clamp(stats.committed));
    }

    pub fn set_poll_failures(&self, device: &str, failures: u64) {
        self.poll_failures
            .with_label_values(&[device])
            .set(clamp(failures));
    }

    pub fn set_bus_messages(&self, sent: u64, failed: u64) {
        self.bus_messages
            .with_label_values(&["sent"])
            .set(clamp(sent));
        self.bus_messages
            .with_label_values(&["failed"])
            .set(clamp(failed));
    }
}

pub use prometheus;
