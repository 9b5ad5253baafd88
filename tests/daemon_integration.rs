//! ---
//! vs_section: "15-testing-qa-runbook"
//! vs_subsection: "integration-tests"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "End-to-end daemon scenarios over HTTP, websocket and bus."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value as JsonValue};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use vesense_common::AppConfig;
use vesense_dataflow::Filter;
use vesense_devices::{RawRegister, RegisterReader};
use vesense_metrics::new_registry;
use vesense_msg::InMemoryTransport;
use vesense_vfs::OpenMode;
use vesensed::{DaemonBuilder, DaemonHandle, ReaderFactory};

const CONFIG: &str = r#"
[devices.house]
model = "bmv-700-essential"
device = "/dev/ttyUSB0"
poll_interval_ms = 20
frontend_config = { Title = "House" }

[devices.start]
model = "bmv-702"
device = "dummy"
poll_interval_ms = 20

[cameras.cam1]
user = "cam"
password = "secret"

[mqtt]
broker = "tcp://broker:1883"
topic_prefix = "boat/"

[http_server]
listen = "127.0.0.1:0"
"#;

/// Serial link answering with fixed register contents.
struct FixedRegisters;

#[async_trait]
impl RegisterReader for FixedRegisters {
    async fn read_register(&self, address: u16) -> Result<RawRegister> {
        match address {
            0xED8D => Ok(RawRegister::u16(1261)),
            0xED8F => Ok(RawRegister::u16((-32i16) as u16)),
            0xED8E => Ok(RawRegister::u16((-40i16) as u16)),
            other => bail!("no register {other:#06x}"),
        }
    }
}

struct FixedFactory;

impl ReaderFactory for FixedFactory {
    fn open(&self, device_path: &str) -> Result<Arc<dyn RegisterReader>> {
        assert_eq!(device_path, "/dev/ttyUSB0");
        Ok(Arc::new(FixedRegisters))
    }
}

async fn start(transport: &InMemoryTransport) -> DaemonHandle {
    let config: AppConfig = CONFIG.parse().unwrap();
    DaemonBuilder::new(config)
        .with_reader_factory(Arc::new(FixedFactory))
        .with_bus_transport(Arc::new(transport.clone()))
        .with_metrics_registry(new_registry())
        .start()
        .await
        .unwrap()
}

async fn wait_until(mut ready: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !ready() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

#[tokio::test]
async fn polled_values_reach_rest_and_bus() {
    let transport = InMemoryTransport::new();
    let handle = start(&transport).await;
    let rounded = handle.pipeline().rounded().clone();
    wait_until(|| {
        rounded
            .snapshot(&Filter::devices(["house"]))
            .len()
            == 3
    })
    .await;

    let base = format!("http://{}", handle.api().unwrap().local_addr());
    let client = reqwest::Client::new();
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
            {"Device": "house", "Name": "Current", "Value": -3.2},
            {"Device": "house", "Name": "MainVoltage", "Value": 12.61},
            {"Device": "house", "Name": "Power", "Value": -40.0}
        ])
    );

    let devices: JsonValue = client
        .get(format!("{base}/api/v0/devices"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(devices[0]["FrontendConfig"]["Title"], json!("House"));
    assert_eq!(devices[2]["Name"], json!("cam1"));

    let yaml = client
        .get(format!("{base}/api/v0/hass/mqtt-sensors.yaml"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(yaml.contains("state_topic: boat/tele/ve/house/MainVoltage"));

    let metrics = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("vesense_devices 3"));

    drop(client);
    handle.shutdown().await.unwrap();

    let messages = transport.drain();
    assert_eq!(messages.first().unwrap().payload, "Online");
    assert_eq!(messages.last().unwrap().payload, "Offline");
    let voltage = messages
        .iter()
        .find(|message| message.topic == "boat/tele/ve/house/MainVoltage")
        .expect("house voltage published");
    let body: JsonValue = serde_json::from_str(&voltage.payload).unwrap();
    assert_eq!(body["Value"], json!(12.61));
    assert_eq!(body["Unit"], json!("V"));
}

#[tokio::test]
async fn websocket_stream_only_carries_requested_devices() {
    let transport = InMemoryTransport::new();
    let handle = start(&transport).await;
    let url = format!(
        "ws://{}/api/v0/ws/rounded-values?devices=start",
        handle.api().unwrap().local_addr()
    );
    let (mut socket, _response) = connect_async(&url).await.unwrap();

    for _ in 0..5 {
        let message = timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = match message {
            Message::Text(text) => text,
            other => panic!("unexpected frame: {other:?}"),
        };
        let value: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(value["DeviceName"], json!("start"));
        assert!(value["ValueName"].is_string());
        assert!(value["Value"].is_number());
    }

    drop(socket);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn camera_upload_is_served_as_picture() {
    let transport = InMemoryTransport::new();
    let handle = start(&transport).await;
    let driver = handle.ftp_driver();
    assert!(driver.authenticate("cam", "wrong").is_err());

    let mut session = driver.authenticate("cam", "secret").unwrap();
    session.change_directory("snapshots").unwrap();
    for index in 0..7u8 {
        let stream = session
            .open_file(&format!("img{index}.jpg"), OpenMode::Write)
            .unwrap();
        let vesense_vfs::FileStream::Write(mut writer) = stream else {
            panic!("write stream expected");
        };
        writer.write_all(&[0xFF, 0xD8, index]).unwrap();
        session
            .close_file(vesense_vfs::FileStream::Write(writer))
            .unwrap();
    }
    assert_eq!(session.list_files().len(), 5);

    let base = format!("http://{}", handle.api().unwrap().local_addr());
    let client = reqwest::Client::new();
    let picture = client
        .get(format!("{base}/api/v0/devices/cam1/picture"))
        .send()
        .await
        .unwrap();
    assert_eq!(picture.status().as_u16(), 200);
    assert_eq!(picture.bytes().await.unwrap().as_ref(), &[0xFF, 0xD8, 6]);

    let none = client
        .get(format!("{base}/api/v0/devices/house/picture"))
        .send()
        .await
        .unwrap();
    assert_eq!(none.status().as_u16(), 404);

    drop(client);
    handle.shutdown().await.unwrap();
}
