//! ---
//! vs_section: "05-messaging"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Message-bus topics, payloads and publication."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::Result;

/// One message handed to the broker client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Destination topic.
    pub topic: String,
    /// Encoded body.
    pub payload: String,
    /// Delivery quality of service (0, 1 or 2).
    pub qos: u8,
    /// Whether the broker should keep the message for late subscribers.
    pub retain: bool,
}

/// Broker client abstraction. Publishing is fire-and-forget.
pub trait BusTransport: Send + Sync {
    /// Hand a message to the broker.
    fn publish(&self, message: BusMessage) -> Result<()>;
    /// Human-readable transport name for logging/metrics.
    fn name(&self) -> &'static str;
}

/// Queue-backed transport for tests and single-process integration.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    queue: Arc<Mutex<VecDeque<BusMessage>>>,
}

impl InMemoryTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the oldest published message.
    pub fn recv(&self) -> Option<BusMessage> {
        self.queue.lock().pop_front()
    }

    /// Take every queued message.
    pub fn drain(&self) -> Vec<BusMessage> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl BusTransport for InMemoryTransport {
    fn publish(&self, message: BusMessage) -> Result<()> {
        self.queue.lock().push_back(message);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

/// Writes every message to the tracing log; used when no broker client is linked.
#[derive(Debug, Clone, Default)]
pub struct LogTransport {
    broker: String,
}

impl LogTransport {
    /// Transport labelled with the configured broker address.
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
        }
    }
}

impl BusTransport for LogTransport {
    fn publish(&self, message: BusMessage) -> Result<()> {
        debug!(
            broker = %self.broker,
            topic = %message.topic,
            payload = %message.payload,
            qos = message.qos,
            retain = message.retain,
            "bus publish"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(topic: &str) -> BusMessage {
        BusMessage {
            topic: topic.into(),
            payload: "{}".into(),
            qos: 1,
            retain: false,
        }
    }

    #[test]
    fn in_memory_transport_is_fifo() {
        let transport = InMemoryTransport::new();
        transport.publish(message("a")).unwrap();
        transport.publish(message("b")).unwrap();
        assert_eq!(transport.len(), 2);
        assert_eq!(transport.recv().unwrap().topic, "a");
        assert_eq!(transport.drain(), vec![message("b")]);
        assert!(transport.is_empty());
    }

    #[test]
    fn log_transport_accepts_everything() {
        let transport = LogTransport::new("tcp://localhost:1883");
        assert!(transport.publish(message("a")).is_ok());
        assert_eq!(transport.name(), "log");
    }
}
