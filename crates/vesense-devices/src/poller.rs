//! ---
//! vs_section: "03-devices"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Device models, telemetry sources and polling."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use vesense_common::SharedClock;
use vesense_dataflow::{Device, Value, ValueStore};

use crate::model::Model;
use crate::source::TelemetrySource;

/// Tick counters of one poller.
#[derive(Debug, Default)]
pub struct PollStats {
    ticks: AtomicU64,
    failures: AtomicU64,
    published: AtomicU64,
}

impl PollStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

/// Periodically polls one device and publishes its readings into the raw store.
pub struct DevicePoller {
    device: Arc<Device>,
    model: Arc<Model>,
    source: Box<dyn TelemetrySource>,
    store: Arc<ValueStore>,
    clock: SharedClock,
    interval: Duration,
    debug_print: bool,
    stats: Arc<PollStats>,
}

impl DevicePoller {
    pub fn new(
        device: Arc<Device>,
        model: Arc<Model>,
        source: Box<dyn TelemetrySource>,
        store: Arc<ValueStore>,
        clock: SharedClock,
        interval: Duration,
    ) -> Self {
        Self {
            device,
            model,
            source,
            store,
            clock,
            interval,
            debug_print: false,
            stats: Arc::new(PollStats::default()),
        }
    }

    /// Log every reading at info level.
    pub fn with_debug_print(mut self, enabled: bool) -> Self {
        self.debug_print = enabled;
        self
    }

    pub fn stats(&self) -> Arc<PollStats> {
        self.stats.clone()
    }

    /// Run one poll. Returns the number of values published; a failed poll
    /// publishes nothing.
    pub async fn poll_tick(&self) -> usize {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        let readings = match self.source.poll_once().await {
            Ok(readings) => readings,
            Err(err) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(device = %self.device.name(), error = %err, "poll failed; tick skipped");
                return 0;
            }
        };
        let timestamp = self.clock.now();
        let mut published = 0;
        for (name, reading) in readings {
            let mut value = Value::new(self.device.clone(), name, reading, timestamp);
            if let Some(register) = self.model.register(&value.name) {
                value = value
                    .with_unit(register.unit)
                    .with_round_decimals(register.round_decimals);
            }
            if self.debug_print {
                info!(device = %self.device.name(), name = %value.name, value = value.value, unit = %value.unit, "reading");
            }
            self.store.publish(value);
            published += 1;
        }
        self.stats
            .published
            .fetch_add(published as u64, Ordering::Relaxed);
        published
    }

    /// Tick until the shutdown broadcast fires.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(device = %self.device.name(), model = %self.model.tag(), interval_ms = self.interval.as_millis() as u64, "poller started");
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!(device = %self.device.name(), "poller shutdown signal received");
                        break;
                    }
                    _ = interval.tick() => {
                        self.poll_tick().await;
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for DevicePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePoller")
            .field("device", &self.device.name())
            .field("model", &self.model.tag())
            .field("interval", &self.interval)
            .finish()
    }
}

/// Running pollers sharing one shutdown broadcast.
#[derive(Debug)]
pub struct PollerGroup {
    shutdown: broadcast::Sender<()>,
    tasks: Vec<(String, JoinHandle<()>)>,
    stats: Vec<(String, Arc<PollStats>)>,
}

impl Default for PollerGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl PollerGroup {
    pub fn new() -> Self {
        let (shutdown, _) = broadcast::channel(4);
        Self {
            shutdown,
            tasks: Vec::new(),
            stats: Vec::new(),
        }
    }

    pub fn spawn(&mut self, poller: DevicePoller) {
        let name = poller.device.name().to_owned();
        self.stats.push((name.clone(), poller.stats()));
        let task = poller.spawn(self.shutdown.subscribe());
        self.tasks.push((name, task));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stats per device name.
    pub fn stats(&self) -> &[(String, Arc<PollStats>)] {
        &self.stats
    }

    /// Total failed polls across every device.
    pub fn failures(&self) -> u64 {
        self.stats.iter().map(|(_, stats)| stats.failures()).sum()
    }

    /// Signal every poller and wait for them to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        for (device, task) in self.tasks {
            if let Err(err) = task.await {
                error!(device = %device, error = %err, "poller task join error");
            }
        }
        info!("pollers stopped");
    }
}
