//! ---
//! vs_section: "01-core-functionality"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Pipeline wiring and ordered lifecycle of the daemon."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use vesense_common::{AppConfig, DeviceConfig, SharedClock, SystemClock};
use vesense_dataflow::Pipeline;
use vesense_devices::{
    DevicePoller, DummySource, Model, ModelRegistry, PollStats, PollerGroup, RegisterReader,
    RegisterSource, TelemetrySource,
};
use vesense_metrics::{PipelineMetrics, SharedRegistry};
use vesense_msg::{BusPublisher, BusTransport, LogTransport, PublisherStats};
use vesense_net::{ApiServerBuilder, ApiServerHandle};
use vesense_vfs::{CameraCredentials, FtpDriver, ListenSettings, VirtualFileStore};

/// Model tag every camera is registered under.
pub const CAMERA_MODEL: &str = "ftp-camera";

const METRICS_REFRESH: Duration = Duration::from_secs(5);

/// Opens the serial register link of a non-dummy device.
pub trait ReaderFactory: Send + Sync {
    fn open(&self, device_path: &str) -> Result<Arc<dyn RegisterReader>>;
}

/// Factory used when no serial protocol driver is linked into the build.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSerialDriver;

impl ReaderFactory for NoSerialDriver {
    fn open(&self, device_path: &str) -> Result<Arc<dyn RegisterReader>> {
        Err(anyhow!(
            "no serial register driver available for {device_path}; use device = \"dummy\""
        ))
    }
}

/// Configures and starts every daemon component.
pub struct DaemonBuilder {
    config: AppConfig,
    clock: SharedClock,
    readers: Arc<dyn ReaderFactory>,
    transport: Option<Arc<dyn BusTransport>>,
    metrics: Option<SharedRegistry>,
}

impl DaemonBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            clock: SystemClock::shared(),
            readers: Arc::new(NoSerialDriver),
            transport: None,
            metrics: None,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reader_factory(mut self, readers: Arc<dyn ReaderFactory>) -> Self {
        self.readers = readers;
        self
    }

    /// Broker client used when `[mqtt]` is configured. Defaults to [`LogTransport`].
    pub fn with_bus_transport(mut self, transport: Arc<dyn BusTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_metrics_registry(mut self, registry: SharedRegistry) -> Self {
        self.metrics = Some(registry);
        self
    }

    /// Wire the pipeline and start pollers, publisher and HTTP server.
    /// Unknown models and unopenable devices are fatal.
    pub async fn start(self) -> Result<DaemonHandle> {
        let config = self.config;
        let pipeline = Pipeline::new(&config.dataflow, self.clock.clone());
        let models = Arc::new(ModelRegistry::builtin());

        let mut pollers = PollerGroup::new();
        for (name, device_config) in &config.devices {
            let model = models
                .get(&device_config.model)
                .with_context(|| format!("device '{name}'"))?;
            let device = pipeline.registry().create(
                name.as_str(),
                device_config.model.as_str(),
                device_config.frontend_config.clone(),
            )?;
            let source = open_source(name, device_config, model.clone(), self.readers.as_ref())
                .with_context(|| format!("device '{name}'"))?;
            let poller = DevicePoller::new(
                device,
                model,
                source,
                pipeline.raw().clone(),
                self.clock.clone(),
                device_config.poll_interval,
            )
            .with_debug_print(device_config.debug_print);
            pollers.spawn(poller);
        }

        let mut credentials = Vec::with_capacity(config.cameras.len());
        for (name, camera) in &config.cameras {
            models.get(CAMERA_MODEL)?;
            pipeline.registry().create(
                name.as_str(),
                CAMERA_MODEL,
                camera.frontend_config.clone(),
            )?;
            credentials.push(CameraCredentials {
                device: name.clone(),
                user: camera.user.clone(),
                password: camera.password.clone(),
            });
        }

        let files = Arc::new(VirtualFileStore::new(
            config.file_store.retain_per_directory,
            self.clock.clone(),
        ));
        let driver = FtpDriver::new(files.clone(), pipeline.registry().clone(), credentials);
        if let Some(ftp) = &config.ftp_server {
            let listen = ListenSettings::from(ftp);
            info!(
                listen = %listen.listen_addr,
                passive_start = *listen.passive_ports.start(),
                passive_end = *listen.passive_ports.end(),
                cameras = config.cameras.len(),
                "file transfer driver ready"
            );
        }

        let publisher = config.mqtt.as_ref().map(|mqtt| {
            let transport: Arc<dyn BusTransport> = match &self.transport {
                Some(transport) => transport.clone(),
                None => Arc::new(LogTransport::new(mqtt.broker.clone())),
            };
            BusPublisher::spawn(pipeline.rounded(), transport, mqtt.clone())
        });

        let (shutdown_tx, _) = broadcast::channel(1);
        let refresher = match &self.metrics {
            Some(registry) => {
                let metrics = PipelineMetrics::new(registry.clone())?;
                let source = MetricsSource {
                    pipeline: pipeline.clone(),
                    files: files.clone(),
                    polls: pollers
                        .stats()
                        .iter()
                        .map(|(name, stats)| (name.clone(), stats.clone()))
                        .collect(),
                    publisher: publisher.as_ref().map(BusPublisher::stats),
                    metrics,
                };
                source.refresh();
                Some(source.spawn(shutdown_tx.subscribe()))
            }
            None => None,
        };

        let api = match &config.http_server {
            Some(http) => {
                let mut builder = ApiServerBuilder::new(http.listen, pipeline.clone())
                    .with_file_store(files.clone());
                if let Some(mqtt) = &config.mqtt {
                    builder = builder.with_discovery(models.clone(), mqtt.clone());
                }
                if let Some(registry) = &self.metrics {
                    builder = builder.with_metrics_registry(registry.clone());
                }
                Some(builder.spawn().await?)
            }
            None => None,
        };

        info!(
            devices = config.devices.len(),
            cameras = config.cameras.len(),
            mqtt = publisher.is_some(),
            http = api.is_some(),
            "daemon started"
        );

        Ok(DaemonHandle {
            pipeline,
            models,
            files,
            driver,
            pollers,
            publisher,
            api,
            refresher,
            shutdown: shutdown_tx,
        })
    }
}

fn open_source(
    name: &str,
    config: &DeviceConfig,
    model: Arc<Model>,
    readers: &dyn ReaderFactory,
) -> Result<Box<dyn TelemetrySource>> {
    if config.is_dummy() {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        debug!(device = name, "using dummy telemetry source");
        return Ok(Box::new(DummySource::new(model, hasher.finish())));
    }
    let reader = readers.open(&config.device)?;
    Ok(Box::new(RegisterSource::new(model, reader)))
}

struct MetricsSource {
    pipeline: Pipeline,
    files: Arc<VirtualFileStore>,
    polls: Vec<(String, Arc<PollStats>)>,
    publisher: Option<Arc<PublisherStats>>,
    metrics: PipelineMetrics,
}

impl MetricsSource {
    fn refresh(&self) {
        let metrics = &self.metrics;
        metrics.set_device_count(self.pipeline.registry().len());
        for store in [self.pipeline.raw(), self.pipeline.rounded()] {
            metrics.observe_store(store.label(), &store.stats());
        }
        metrics.observe_rounder(&self.pipeline.rounder().stats());
        metrics.observe_file_store(&self.files.stats());
        for (device, stats) in &self.polls {
            metrics.set_poll_failures(device, stats.failures());
        }
        if let Some(publisher) = &self.publisher {
            metrics.set_bus_messages(publisher.sent(), publisher.failed());
        }
    }

    fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(METRICS_REFRESH);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = interval.tick() => self.refresh(),
                }
            }
            self.refresh();
        })
    }
}

/// Running daemon. Dropping it leaves background tasks running; call
/// [`DaemonHandle::shutdown`].
pub struct DaemonHandle {
    pipeline: Pipeline,
    models: Arc<ModelRegistry>,
    files: Arc<VirtualFileStore>,
    driver: FtpDriver,
    pollers: PollerGroup,
    publisher: Option<BusPublisher>,
    api: Option<ApiServerHandle>,
    refresher: Option<JoinHandle<()>>,
    shutdown: broadcast::Sender<()>,
}

impl DaemonHandle {
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn models(&self) -> &Arc<ModelRegistry> {
        &self.models
    }

    pub fn files(&self) -> &Arc<VirtualFileStore> {
        &self.files
    }

    /// Driver handed to the file-transfer listener.
    pub fn ftp_driver(&self) -> &FtpDriver {
        &self.driver
    }

    pub fn pollers(&self) -> &PollerGroup {
        &self.pollers
    }

    pub fn api(&self) -> Option<&ApiServerHandle> {
        self.api.as_ref()
    }

    /// Stop pollers, then the bus publisher, then the HTTP server.
    pub async fn shutdown(self) -> Result<()> {
        self.pollers.shutdown().await;
        if let Some(publisher) = self.publisher {
            publisher.shutdown().await;
        }
        let api_result = match self.api {
            Some(api) => api.shutdown().await,
            None => Ok(()),
        };
        let _ = self.shutdown.send(());
        if let Some(task) = self.refresher {
            if let Err(err) = task.await {
                error!(error = %err, "metrics refresher join error");
            }
        }
        self.pipeline.shutdown();
        info!("daemon stopped");
        api_result
    }
}

impl std::fmt::Debug for DaemonHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonHandle")
            .field("devices", &self.pipeline.registry().len())
            .field("pollers", &self.pollers.len())
            .field("publisher", &self.publisher.is_some())
            .field("api", &self.api.as_ref().map(ApiServerHandle::local_addr))
            .finish_non_exhaustive()
    }
}
