//! ---
//! vs_section: "07-networking-external-interfaces"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "REST snapshot API and server lifecycle."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use vesense_common::MqttConfig;
use vesense_dataflow::{Device, EssentialValue, Filter, Pipeline};
use vesense_devices::ModelRegistry;
use vesense_metrics::{metrics_handler, SharedRegistry};
use vesense_msg::{hass_sensors, render_hass_yaml};
use vesense_vfs::VirtualFileStore;

use crate::error::ApiError;
use crate::picture::thumbnail;
use crate::websocket::rounded_values_stream;

const DEVICE_INDEX_CACHE: &str = "public, max-age=300";

struct Discovery {
    models: Arc<ModelRegistry>,
    mqtt: MqttConfig,
}

/// Shared state injected into the axum handlers.
pub(crate) struct ApiState {
    pub(crate) pipeline: Pipeline,
    files: Option<Arc<VirtualFileStore>>,
    discovery: Option<Discovery>,
    metrics: Option<SharedRegistry>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

/// Builder used to configure and spawn the API server.
pub struct ApiServerBuilder {
    listen: SocketAddr,
    pipeline: Pipeline,
    files: Option<Arc<VirtualFileStore>>,
    discovery: Option<Discovery>,
    metrics: Option<SharedRegistry>,
}

impl ApiServerBuilder {
    /// Serve the devices and rounded values of `pipeline` on `listen`.
    pub fn new(listen: SocketAddr, pipeline: Pipeline) -> Self {
        Self {
            listen,
            pipeline,
            files: None,
            discovery: None,
            metrics: None,
        }
    }

    /// Enable the picture endpoint.
    pub fn with_file_store(mut self, files: Arc<VirtualFileStore>) -> Self {
        self.files = Some(files);
        self
    }

    /// Enable the Home Assistant discovery document.
    pub fn with_discovery(mut self, models: Arc<ModelRegistry>, mqtt: MqttConfig) -> Self {
        self.discovery = Some(Discovery { models, mqtt });
        self
    }

    /// Attach a Prometheus registry exposed at `/metrics`.
    pub fn with_metrics_registry(mut self, registry: SharedRegistry) -> Self {
        self.metrics = Some(registry);
        self
    }

    /// Bind the listener and serve until [`ApiServerHandle::shutdown`].
    pub async fn spawn(self) -> anyhow::Result<ApiServerHandle> {
        let listener = TcpListener::bind(self.listen)
            .await
            .with_context(|| format!("failed to bind API listener {}", self.listen))?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "api server listening");

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let state = ApiState {
            pipeline: self.pipeline,
            files: self.files,
            discovery: self.discovery,
            metrics: self.metrics,
            shutdown: shutdown_rx.clone(),
        };
        let router = Router::new()
            .route("/api/v0/devices", get(list_devices))
            .route("/api/v0/devices/:name/rounded-values", get(rounded_values))
            .route("/api/v0/devices/:name/picture", get(picture_raw))
            .route("/api/v0/devices/:name/picture/raw", get(picture_raw))
            .route("/api/v0/devices/:name/picture/thumb", get(picture_thumb))
            .route("/api/v0/hass/mqtt-sensors.yaml", get(hass_yaml))
            .route("/api/v0/ws/rounded-values", get(rounded_values_stream))
            .route("/metrics", get(get_metrics))
            .with_state(Arc::new(state))
            .layer(TraceLayer::new_for_http());

        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "api server exited with error");
            }
        });

        Ok(ApiServerHandle {
            address: local_addr,
            task,
            shutdown: shutdown_tx,
        })
    }
}

/// Handle returned from [`ApiServerBuilder::spawn`].
#[derive(Debug)]
pub struct ApiServerHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl ApiServerHandle {
    /// Socket address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Close live streams, stop accepting requests and wait for the server task.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(()) => {
                info!(address = %self.address, "api server stopped");
                Ok(())
            }
            Err(join) => Err(anyhow::anyhow!(join)),
        }
    }
}

async fn list_devices(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let devices: Vec<Device> = state
        .pipeline
        .registry()
        .get_all()
        .iter()
        .map(|device| device.as_ref().clone())
        .collect();
    (
        [(
            header::CACHE_CONTROL,
            HeaderValue::from_static(DEVICE_INDEX_CACHE),
        )],
        Json(devices),
    )
}

async fn rounded_values(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<EssentialValue>>, ApiError> {
    let device = state.pipeline.registry().get_by_name(&name)?;
    let snapshot = state.pipeline.rounded().snapshot(&Filter::device(&device));
    Ok(Json(snapshot.essential_view()))
}

fn latest_picture(state: &ApiState, name: &str) -> Result<Bytes, ApiError> {
    let device = state.pipeline.registry().get_by_name(name)?;
    let files = state
        .files
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("file store not configured".into()))?;
    let file = files
        .latest_for_device(device.name())
        .ok_or_else(|| ApiError::NotFound(format!("no picture for {}", device.name())))?;
    Ok(file.payload())
}

fn jpeg_response(body: impl IntoResponse) -> Response {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg"))],
        body,
    )
        .into_response()
}

async fn picture_raw(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    Ok(jpeg_response(latest_picture(&state, &name)?))
}

async fn picture_thumb(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let payload = latest_picture(&state, &name)?;
    let thumb = tokio::task::spawn_blocking(move || thumbnail(&payload))
        .await
        .map_err(|err| ApiError::Internal(format!("thumbnail task failed: {err}")))?
        .map_err(|err| ApiError::Internal(format!("cannot thumbnail picture of {name}: {err}")))?;
    Ok(jpeg_response(thumb))
}

async fn hass_yaml(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    let discovery = state
        .discovery
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("mqtt not configured".into()))?;
    let sensors = hass_sensors(
        &state.pipeline.registry().get_all(),
        &discovery.models,
        &discovery.mqtt,
    );
    let yaml = render_hass_yaml(&sensors)?;
    Ok((
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/yaml"),
        )],
        yaml,
    )
        .into_response())
}

async fn get_metrics(State(state): State<Arc<ApiState>>) -> Response {
    let Some(registry) = &state.metrics else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics registry unavailable",
        )
            .into_response();
    };
    metrics_handler(registry.clone()).await.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use reqwest::Client;
    use serde_json::{json, Value as JsonValue};
    use std::io::Write;
    use vesense_common::{DataflowConfig, ManualClock, SharedClock};
    use vesense_dataflow::Value;
    use vesense_metrics::{new_registry, PipelineMetrics};

    use crate::picture::tests::sample_jpeg;
    use crate::picture::{THUMB_HEIGHT, THUMB_WIDTH};
    use image::GenericImageView;

    fn pipeline() -> (Pipeline, SharedClock) {
        let clock: SharedClock = ManualClock::epoch();
        let pipeline = Pipeline::new(&DataflowConfig::default(), clock.clone());
        let registry = pipeline.registry();
        registry
            .create("house", "bmv-702", json!({"Title": "House battery"}))
            .unwrap();
        registry.create("cam1", "ftp-camera", json!(null)).unwrap();
        (pipeline, clock)
    }

    #[tokio::test]
    async fn snapshot_endpoints_serve_rounded_values() {
        let (pipeline, _clock) = pipeline();
        let house = pipeline.registry().get_by_name("house").unwrap();
        let at = DateTime::from_timestamp(0, 0).unwrap();
        pipeline
            .raw()
            .publish(Value::new(house.clone(), "Current", -3.26, at).with_round_decimals(1));
        pipeline
            .raw()
            .publish(Value::new(house, "MainVoltage", 12.614, at).with_round_decimals(2));

        let handle = ApiServerBuilder::new("127.0.0.1:0".parse().unwrap(), pipeline)
            .spawn()
            .await
            .unwrap();
        let client = Client::new();
        let base = format!("http://{}", handle.local_addr());

        let index = client
            .get(format!("{base}/api/v0/devices"))
            .send()
            .await
            .unwrap();
        assert_eq!(
            index.headers()[header::CACHE_CONTROL.as_str()],
            "public, max-age=300"
        );
        let devices: JsonValue = index.json().await.unwrap();
        assert_eq!(devices[0]["Name"], json!("house"));
        assert_eq!(devices[0]["FrontendConfig"]["Title"], json!("House battery"));
        assert_eq!(devices[1]["Model"], json!("ftp-camera"));

        let values: JsonValue = client
            .get(format!("{base}/api/v0/devices/house/rounded-values"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(
            values,
            json!([
                {"Device": "house", "Name": "Current", "Value": -3.3},
                {"Device": "house", "Name": "MainVoltage", "Value": 12.61}
            ])
        );

        let missing = client
            .get(format!("{base}/api/v0/devices/nope/rounded-values"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let hass = client
            .get(format!("{base}/api/v0/hass/mqtt-sensors.yaml"))
            .send()
            .await
            .unwrap();
        assert_eq!(hass.status(), StatusCode::NOT_FOUND);

        let metrics = client.get(format!("{base}/metrics")).send().await.unwrap();
        assert_eq!(metrics.status(), StatusCode::SERVICE_UNAVAILABLE);

        drop(client);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn picture_serves_newest_upload_raw_and_thumbnailed() {
        let (pipeline, clock) = pipeline();
        let files = Arc::new(VirtualFileStore::new(5, clock));
        let cam = pipeline.registry().get_by_name("cam1").unwrap();
        let newest = sample_jpeg(640, 480);
        for (path, body) in [("/cam1/a.jpg", b"old".as_slice()), ("/cam1/b.jpg", newest.as_slice())] {
            let mut handle = files.open_for_write(path, false, cam.clone()).unwrap();
            handle.write_all(body).unwrap();
            files.close_write(handle).unwrap();
        }

        let handle = ApiServerBuilder::new("127.0.0.1:0".parse().unwrap(), pipeline)
            .with_file_store(files)
            .spawn()
            .await
            .unwrap();
        let client = Client::new();
        let base = format!("http://{}", handle.local_addr());

        for route in ["picture", "picture/raw"] {
            let response = client
                .get(format!("{base}/api/v0/devices/cam1/{route}"))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()[header::CONTENT_TYPE.as_str()],
                "image/jpeg"
            );
            assert_eq!(response.bytes().await.unwrap().as_ref(), newest.as_slice());
        }

        let thumb = client
            .get(format!("{base}/api/v0/devices/cam1/picture/thumb"))
            .send()
            .await
            .unwrap();
        assert_eq!(thumb.status(), StatusCode::OK);
        let decoded = image::load_from_memory(&thumb.bytes().await.unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (THUMB_WIDTH, THUMB_HEIGHT));

        for route in ["picture", "picture/thumb"] {
            let none = client
                .get(format!("{base}/api/v0/devices/house/{route}"))
                .send()
                .await
                .unwrap();
            assert_eq!(none.status(), StatusCode::NOT_FOUND);
        }

        drop(client);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn thumb_of_undecodable_upload_is_a_server_error() {
        let (pipeline, clock) = pipeline();
        let files = Arc::new(VirtualFileStore::new(5, clock));
        let cam = pipeline.registry().get_by_name("cam1").unwrap();
        let mut upload = files.open_for_write("/cam1/bad.jpg", false, cam).unwrap();
        upload.write_all(b"\xFF\xD8truncated").unwrap();
        files.close_write(upload).unwrap();

        let handle = ApiServerBuilder::new("127.0.0.1:0".parse().unwrap(), pipeline)
            .with_file_store(files)
            .spawn()
            .await
            .unwrap();
        let client = Client::new();
        let response = client
            .get(format!(
                "http://{}/api/v0/devices/cam1/picture/thumb",
                handle.local_addr()
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        drop(client);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn discovery_and_metrics_when_attached() {
        let (pipeline, _clock) = pipeline();
        let registry = new_registry();
        let metrics = PipelineMetrics::new(registry.clone()).unwrap();
        metrics.set_device_count(pipeline.registry().len());

        let handle = ApiServerBuilder::new("127.0.0.1:0".parse().unwrap(), pipeline)
            .with_discovery(
                Arc::new(ModelRegistry::builtin()),
                MqttConfig::new("tcp://broker:1883"),
            )
            .with_metrics_registry(registry)
            .spawn()
            .await
            .unwrap();
        let client = Client::new();
        let base = format!("http://{}", handle.local_addr());

        let yaml = client
            .get(format!("{base}/api/v0/hass/mqtt-sensors.yaml"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(yaml.contains("house_MainVoltage"));
        assert!(yaml.contains("house_AuxVoltage"));

        let text = client
            .get(format!("{base}/metrics"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(text.contains("vesense_devices 2"));

        drop(client);
        handle.shutdown().await.unwrap();
    }
}
