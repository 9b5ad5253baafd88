//! ---
//! vs_section: "05-messaging"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Message-bus topics, payloads and publication."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vesense_common::MqttConfig;
use vesense_dataflow::{Filter, Value, ValueStore};

use crate::payload::{RealtimePayload, PAYLOAD_AVAILABLE, PAYLOAD_NOT_AVAILABLE};
use crate::topic::{availability_topic, realtime_topic};
use crate::transport::{BusMessage, BusTransport};

/// Publish counters.
#[derive(Debug, Default)]
pub struct PublisherStats {
    sent: AtomicU64,
    failed: AtomicU64,
}

impl PublisherStats {
    /// Messages accepted by the transport.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Messages the transport rejected.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

struct Worker {
    transport: Arc<dyn BusTransport>,
    config: MqttConfig,
    availability: String,
    stats: Arc<PublisherStats>,
}

impl Worker {
    fn send(&self, message: BusMessage) {
        let topic = message.topic.clone();
        match self.transport.publish(message) {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(transport = self.transport.name(), topic = %topic, error = %err, "bus publish failed");
            }
        }
    }

    fn send_availability(&self, payload: &str) {
        self.send(BusMessage {
            topic: self.availability.clone(),
            payload: payload.to_owned(),
            qos: self.config.qos,
            retain: true,
        });
    }

    fn send_value(&self, value: &Value) {
        let payload = match RealtimePayload::from(value).to_json() {
            Ok(payload) => payload,
            Err(err) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(device = %value.device.name(), name = %value.name, error = %err, "payload encoding failed");
                return;
            }
        };
        self.send(BusMessage {
            topic: realtime_topic(
                &self.config,
                value.device.name(),
                value.device.model(),
                &value.name,
                &value.unit,
            ),
            payload,
            qos: self.config.qos,
            retain: self.config.retain,
        });
    }
}

/// Background task forwarding every rounded value to the bus.
#[derive(Debug)]
pub struct BusPublisher {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
    stats: Arc<PublisherStats>,
}

impl BusPublisher {
    /// Subscribe to `store` and start publishing. `Online` is sent first;
    /// `Offline` is sent when the publisher stops.
    pub fn spawn(
        store: &Arc<ValueStore>,
        transport: Arc<dyn BusTransport>,
        config: MqttConfig,
    ) -> Self {
        let subscription = config
            .realtime_enabled
            .then(|| store.subscribe(Filter::unrestricted()));
        let stats = Arc::new(PublisherStats::default());
        let worker = Worker {
            availability: availability_topic(&config),
            transport,
            config,
            stats: stats.clone(),
        };
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            info!(
                broker = %worker.config.broker,
                client_id = %worker.config.client_id,
                transport = worker.transport.name(),
                "bus publisher started"
            );
            worker.send_availability(PAYLOAD_AVAILABLE);
            match subscription {
                Some(mut subscription) => loop {
                    tokio::select! {
                        _ = &mut shutdown_rx => break,
                        next = subscription.recv() => match next {
                            Some(value) => worker.send_value(&value),
                            None => {
                                debug!("rounded store closed its subscriptions");
                                break;
                            }
                        },
                    }
                },
                None => {
                    let _ = shutdown_rx.await;
                }
            }
            worker.send_availability(PAYLOAD_NOT_AVAILABLE);
            info!(sent = worker.stats.sent(), failed = worker.stats.failed(), "bus publisher stopped");
        });

        Self {
            shutdown: shutdown_tx,
            task,
            stats,
        }
    }

    /// Live counters.
    pub fn stats(&self) -> Arc<PublisherStats> {
        self.stats.clone()
    }

    /// Stop publishing and wait for `Offline` to go out.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.task.await {
            error!(error = %err, "bus publisher task join error");
        }
    }
}
