//! ---
//! vs_section: "04-file-store"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Virtual file store backing camera uploads."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
//! Driver contract handed to the file-transfer listener. The listener owns
//! sockets and sessions; each authenticated session gets a [`ClientDriver`].
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tracing::{debug, info, warn};
use vesense_common::FtpServerConfig;
use vesense_dataflow::{DataflowError, Device, DeviceRegistry};

use crate::path::join;
use crate::store::{EntryInfo, ReadHandle, VirtualFileStore, WriteHandle};
use crate::FileStoreError;

/// Failures reported to the file-transfer listener.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// No camera matches the login.
    #[error("bad username or password")]
    BadCredentials,
    /// The file store refused the operation.
    #[error(transparent)]
    FileStore(#[from] FileStoreError),
    /// The camera's device is not registered.
    #[error(transparent)]
    Dataflow(#[from] DataflowError),
}

/// Static login of one camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraCredentials {
    /// Device name the session is bound to.
    pub device: String,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
}

/// Listener settings derived from `[ftp_server]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenSettings {
    /// Control connection address, `host:port`.
    pub listen_addr: String,
    /// Ports offered for passive data connections.
    pub passive_ports: std::ops::RangeInclusive<u16>,
}

impl From<&FtpServerConfig> for ListenSettings {
    fn from(config: &FtpServerConfig) -> Self {
        let bind = config.bind.trim_start_matches('[').trim_end_matches(']');
        let listen_addr = match bind.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, config.port).to_string(),
            Err(_) => format!("{}:{}", bind, config.port),
        };
        Self {
            listen_addr,
            passive_ports: config.passive_port_start..=config.passive_port_end,
        }
    }
}

/// Entry point of the driver: authenticates camera logins.
#[derive(Debug, Clone)]
pub struct FtpDriver {
    store: Arc<VirtualFileStore>,
    registry: Arc<DeviceRegistry>,
    cameras: Vec<CameraCredentials>,
}

impl FtpDriver {
    /// Driver serving `store` to the listed cameras.
    pub fn new(
        store: Arc<VirtualFileStore>,
        registry: Arc<DeviceRegistry>,
        cameras: Vec<CameraCredentials>,
    ) -> Self {
        Self {
            store,
            registry,
            cameras,
        }
    }

    /// Backing file store.
    pub fn store(&self) -> &Arc<VirtualFileStore> {
        &self.store
    }

    /// Match the login against the configured cameras and bind a session
    /// driver to the camera's device.
    pub fn authenticate(&self, user: &str, password: &str) -> Result<ClientDriver, DriverError> {
        let Some(camera) = self
            .cameras
            .iter()
            .find(|camera| camera.user == user && camera.password == password)
        else {
            warn!(user, "file transfer login rejected");
            return Err(DriverError::BadCredentials);
        };
        let device = self.registry.get_by_name(&camera.device)?;
        info!(user, device = %device.name(), "file transfer login accepted");
        Ok(ClientDriver {
            store: self.store.clone(),
            device,
            cwd: "/".to_owned(),
        })
    }
}

/// How a session opens a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read a committed file.
    Read,
    /// Replace the file.
    Write,
    /// Extend the file, or create it.
    Append,
}

/// Stream handed back to the listener for data transfers.
#[derive(Debug)]
pub enum FileStream {
    /// Download stream.
    Read(ReadHandle),
    /// Upload stream; commit with [`ClientDriver::close_file`].
    Write(WriteHandle),
}

/// Per-session driver bound to one camera device. Relative paths resolve
/// against the session's working directory.
#[derive(Debug)]
pub struct ClientDriver {
    store: Arc<VirtualFileStore>,
    device: Arc<Device>,
    cwd: String,
}

impl ClientDriver {
    /// Camera the session is bound to.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Working directory.
    pub fn current_directory(&self) -> &str {
        &self.cwd
    }

    /// Enter `directory`, creating it on the fly.
    pub fn change_directory(&mut self, directory: &str) -> Result<(), DriverError> {
        let target = join(&self.cwd, directory);
        self.store.create_directory(&target);
        debug!(device = %self.device.name(), directory = %target, "changed directory");
        self.cwd = target;
        Ok(())
    }

    /// Create a directory relative to the working directory.
    pub fn make_directory(&self, directory: &str) -> Result<(), DriverError> {
        self.store.create_directory(&join(&self.cwd, directory));
        Ok(())
    }

    /// Entries of the working directory.
    pub fn list_files(&self) -> Vec<EntryInfo> {
        self.store.list_children(&self.cwd)
    }

    /// Open a transfer stream for `path`.
    pub fn open_file(&self, path: &str, mode: OpenMode) -> Result<FileStream, DriverError> {
        let path = join(&self.cwd, path);
        let stream = match mode {
            OpenMode::Read => FileStream::Read(self.store.open_for_read(&path)?),
            OpenMode::Write => {
                FileStream::Write(self.store.open_for_write(&path, false, self.device.clone())?)
            }
            OpenMode::Append => {
                FileStream::Write(self.store.open_for_write(&path, true, self.device.clone())?)
            }
        };
        Ok(stream)
    }

    /// Finish a transfer. Write streams are committed; read streams are released.
    pub fn close_file(&self, stream: FileStream) -> Result<Option<EntryInfo>, DriverError> {
        match stream {
            FileStream::Read(_) => Ok(None),
            FileStream::Write(handle) => Ok(Some(self.store.close_write(handle)?)),
        }
    }

    /// Stat `path`.
    pub fn file_info(&self, path: &str) -> Result<EntryInfo, DriverError> {
        Ok(self.store.stat(&join(&self.cwd, path))?)
    }

    /// Uploads are never refused for size.
    pub fn can_allocate(&self, _size: u64) -> bool {
        true
    }

    /// Always denied.
    pub fn chmod(&self, path: &str, mode: u32) -> Result<(), DriverError> {
        Ok(self.store.chmod(&join(&self.cwd, path), mode)?)
    }

    /// Always denied.
    pub fn delete(&self, path: &str) -> Result<(), DriverError> {
        Ok(self.store.delete(&join(&self.cwd, path))?)
    }

    /// Always denied.
    pub fn rename(&self, from: &str, to: &str) -> Result<(), DriverError> {
        Ok(self
            .store
            .rename(&join(&self.cwd, from), &join(&self.cwd, to))?)
    }
}
