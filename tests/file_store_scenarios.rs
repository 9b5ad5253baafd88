//! ---
//! vs_section: "15-testing-qa-runbook"
//! vs_subsection: "integration-tests"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Camera upload sessions against the virtual file store."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;

use serde_json::json;
use vesense_common::SystemClock;
use vesense_dataflow::DeviceRegistry;
use vesense_vfs::{
    CameraCredentials, ClientDriver, DriverError, FileStoreError, FileStream, FtpDriver, OpenMode,
    VirtualFileStore,
};

fn driver(cameras: &[&str]) -> FtpDriver {
    let registry = Arc::new(DeviceRegistry::new());
    let mut credentials = Vec::new();
    for name in cameras {
        registry.create(*name, "ftp-camera", json!(null)).unwrap();
        credentials.push(CameraCredentials {
            device: (*name).to_owned(),
            user: format!("{name}-user"),
            password: "pw".to_owned(),
        });
    }
    let store = Arc::new(VirtualFileStore::new(5, SystemClock::shared()));
    FtpDriver::new(store, registry, credentials)
}

fn upload(session: &ClientDriver, name: &str, body: &[u8]) {
    let FileStream::Write(mut writer) = session.open_file(name, OpenMode::Write).unwrap() else {
        panic!("write stream expected");
    };
    writer.write_all(body).unwrap();
    session.close_file(FileStream::Write(writer)).unwrap();
}

fn names(session: &ClientDriver) -> Vec<String> {
    session
        .list_files()
        .into_iter()
        .filter(|entry| !entry.is_dir())
        .map(|entry| entry.name)
        .collect()
}

#[test]
fn concurrent_camera_sessions_keep_their_own_history() {
    let driver = driver(&["cam-a", "cam-b"]);
    let workers: Vec<_> = ["cam-a", "cam-b"]
        .into_iter()
        .map(|camera| {
            let driver = driver.clone();
            thread::spawn(move || {
                let mut session = driver.authenticate(&format!("{camera}-user"), "pw").unwrap();
                session.change_directory(&format!("/{camera}")).unwrap();
                for index in 0..12 {
                    upload(&session, &format!("img{index:02}.jpg"), camera.as_bytes());
                }
                names(&session)
            })
        })
        .collect();

    for worker in workers {
        let kept = worker.join().unwrap();
        assert_eq!(
            kept,
            vec!["img07.jpg", "img08.jpg", "img09.jpg", "img10.jpg", "img11.jpg"]
        );
    }
    let stats = driver.store().stats();
    assert_eq!(stats.files, 10);
    assert_eq!(stats.committed, 24);
    assert_eq!(stats.evicted, 14);
    assert_eq!(
        driver.store().latest_for_device("cam-b").unwrap().path(),
        "/cam-b/img11.jpg"
    );
}

#[test]
fn upload_is_readable_from_a_later_session() {
    let driver = driver(&["cam1"]);
    let mut writer_session = driver.authenticate("cam1-user", "pw").unwrap();
    writer_session.change_directory("incoming").unwrap();
    upload(&writer_session, "shot.jpg", b"\xFF\xD8jpeg");

    let reader_session = driver.authenticate("cam1-user", "pw").unwrap();
    let info = reader_session.file_info("/incoming/shot.jpg").unwrap();
    assert_eq!(info.size, 6);
    let FileStream::Read(mut reader) = reader_session
        .open_file("/incoming/shot.jpg", OpenMode::Read)
        .unwrap()
    else {
        panic!("read stream expected");
    };
    let mut body = Vec::new();
    reader.read_to_end(&mut body).unwrap();
    assert_eq!(body, b"\xFF\xD8jpeg");
    assert!(reader_session
        .close_file(FileStream::Read(reader))
        .unwrap()
        .is_none());
}

#[test]
fn abandoned_upload_leaves_no_trace() {
    let driver = driver(&["cam1"]);
    let session = driver.authenticate("cam1-user", "pw").unwrap();
    let stream = session.open_file("/cam1/partial.jpg", OpenMode::Write).unwrap();
    assert!(matches!(
        session.open_file("/cam1/partial.jpg", OpenMode::Write),
        Err(DriverError::FileStore(FileStoreError::WriteInProgress(_)))
    ));
    drop(stream);

    assert!(matches!(
        session.file_info("/cam1/partial.jpg"),
        Err(DriverError::FileStore(FileStoreError::NotFound(_)))
    ));
    assert_eq!(driver.store().stats().writers, 0);
    upload(&session, "/cam1/partial.jpg", b"retry");
    assert_eq!(session.file_info("/cam1/partial.jpg").unwrap().size, 5);
}

#[test]
fn sessions_cannot_curate_history() {
    let driver = driver(&["cam1"]);
    let session = driver.authenticate("cam1-user", "pw").unwrap();
    upload(&session, "a.jpg", b"a");

    for result in [
        session.delete("a.jpg"),
        session.rename("a.jpg", "b.jpg"),
        session.chmod("a.jpg", 0o600),
    ] {
        assert!(matches!(
            result,
            Err(DriverError::FileStore(FileStoreError::PermissionDenied(_)))
        ));
    }
    assert_eq!(names(&session), vec!["a.jpg"]);
    assert!(session.can_allocate(u64::MAX));
    assert!(matches!(
        driver.authenticate("cam1-user", "nope"),
        Err(DriverError::BadCredentials)
    ));
}
