//! ---
//! vs_section: "07-networking-external-interfaces"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Live rounded-value stream over websocket."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};
use vesense_dataflow::{Filter, Subscription, Value};

use crate::rest::ApiState;

/// Message pushed to websocket clients for every rounded update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LiveValue {
    /// Device name.
    pub device_name: String,
    /// Signal name.
    pub value_name: String,
    /// Rounded magnitude.
    pub value: f64,
}

impl From<&Value> for LiveValue {
    fn from(value: &Value) -> Self {
        Self {
            device_name: value.device.name().to_owned(),
            value_name: value.name.clone(),
            value: value.value,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamQuery {
    #[serde(default)]
    devices: Option<String>,
}

impl StreamQuery {
    /// `devices=a,b` restricts the stream; absent or empty streams everything.
    fn filter(&self) -> Filter {
        let names: Vec<&str> = self
            .devices
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            Filter::unrestricted()
        } else {
            Filter::devices(names)
        }
    }
}

pub(crate) async fn rounded_values_stream(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<Arc<ApiState>>,
) -> Response {
    let subscription = state.pipeline.rounded().subscribe(query.filter());
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| client_loop(socket, subscription, shutdown))
}

async fn client_loop(
    mut socket: WebSocket,
    mut subscription: Subscription,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(subscription = subscription.id(), "websocket client connected");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = subscription.recv() => {
                let Some(value) = next else {
                    break;
                };
                let text = match serde_json::to_string(&LiveValue::from(&value)) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "failed to serialise live value");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    subscription.close();
    let _ = socket.close().await;
    debug!(subscription = subscription.id(), "websocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(devices: Option<&str>) -> StreamQuery {
        StreamQuery {
            devices: devices.map(str::to_owned),
        }
    }

    #[test]
    fn device_list_builds_filter() {
        assert!(query(None).filter().is_unrestricted());
        assert!(query(Some(" , ")).filter().is_unrestricted());
        let filter = query(Some("house, start"));
        let filter = filter.filter();
        assert!(filter.matches_name("house"));
        assert!(filter.matches_name("start"));
        assert!(!filter.matches_name("cam1"));
    }

    #[tokio::test]
    async fn stream_follows_device_filter_and_deregisters() {
        use crate::rest::ApiServerBuilder;
        use chrono::DateTime;
        use futures::StreamExt;
        use serde_json::json;
        use std::time::Duration;
        use tokio::time::{sleep, timeout};
        use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
        use vesense_common::{DataflowConfig, ManualClock, SharedClock};
        use vesense_dataflow::Pipeline;

        let clock: SharedClock = ManualClock::epoch();
        let pipeline = Pipeline::new(&DataflowConfig::default(), clock);
        let house = pipeline.registry().create("house", "bmv-700", json!(null)).unwrap();
        let start = pipeline.registry().create("start", "bmv-700", json!(null)).unwrap();
        let rounded = pipeline.rounded().clone();
        let raw = pipeline.raw().clone();

        let handle = ApiServerBuilder::new("127.0.0.1:0".parse().unwrap(), pipeline)
            .spawn()
            .await
            .unwrap();
        let url = format!("ws://{}/api/v0/ws/rounded-values?devices=house", handle.local_addr());
        let (mut socket, _response) = connect_async(&url).await.unwrap();
        assert_eq!(rounded.stats().subscriptions, 1);

        let at = DateTime::from_timestamp(0, 0).unwrap();
        raw.publish(Value::new(start, "Current", 1.0, at));
        raw.publish(Value::new(house, "Current", -2.0, at));

        let received = timeout(Duration::from_secs(2), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match received {
            WsMessage::Text(text) => {
                let value: LiveValue = serde_json::from_str(&text).unwrap();
                assert_eq!(
                    value,
                    LiveValue {
                        device_name: "house".into(),
                        value_name: "Current".into(),
                        value: -2.0,
                    }
                );
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(timeout(Duration::from_millis(50), socket.next()).await.is_err());

        drop(socket);
        timeout(Duration::from_secs(2), async {
            while rounded.stats().subscriptions > 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscription released after disconnect");
        handle.shutdown().await.unwrap();
    }
}
