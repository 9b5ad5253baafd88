//! ---
//! vs_section: "04-file-store"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Virtual file store backing camera uploads."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
//! Path-addressed in-memory store for camera uploads.
//!
//! Every directory keeps at most `retain_per_directory` committed files; the
//! oldest-created ones are evicted when a write starts and when it commits.
//! Clients cannot delete, rename or chmod anything.
#![warn(missing_docs)]

pub mod driver;
pub mod path;
pub mod retention;
pub mod store;

/// Failures surfaced by the file store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileStoreError {
    /// Nothing is stored at the path.
    #[error("no such file or directory: {0}")]
    NotFound(String),
    /// The operation is never allowed; history cannot be curated.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Another session holds the path open for writing.
    #[error("file is being written by another session: {0}")]
    WriteInProgress(String),
}

/// Result alias for file store operations.
pub type Result<T> = std::result::Result<T, FileStoreError>;

pub use driver::{
    CameraCredentials, ClientDriver, DriverError, FileStream, FtpDriver, ListenSettings, OpenMode,
};
pub use store::{
    EntryInfo, EntryKind, FileStoreStats, ReadHandle, VirtualFile, VirtualFileStore, WriteHandle,
};
