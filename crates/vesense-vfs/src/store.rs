//! ---
//! vs_section: "04-file-store"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Virtual file store backing camera uploads."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};
use vesense_common::SharedClock;
use vesense_dataflow::Device;

use crate::path::{ancestors, dir_prefix, file_name, normalize, parent, strip_dir};
use crate::retention::{select_evictions, RetentionCandidate};
use crate::{FileStoreError, Result};

/// Nominal size reported for directories.
pub const DIRECTORY_SIZE: u64 = 4096;
const MODE_RW: u32 = 0o666;
const MODE_DIR: u32 = 0o040000;

/// A committed upload. Immutable once stored.
#[derive(Debug, Clone)]
pub struct VirtualFile {
    path: String,
    device: Arc<Device>,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    seq: u64,
    payload: Bytes,
}

impl VirtualFile {
    /// Full normalized path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Camera that uploaded the file.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// When the write session opened.
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// When the upload committed.
    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    /// Payload length in bytes.
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Cheap shared view of the content.
    pub fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    fn info(&self) -> EntryInfo {
        EntryInfo {
            name: file_name(&self.path).to_owned(),
            kind: EntryKind::File,
            size: self.size(),
            modified: self.modified,
        }
    }

    fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.created, self.seq)
    }
}

/// Whether a listed entry is a directory or a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Explicit or implied directory.
    Directory,
    /// Committed upload.
    File,
}

/// Listing / stat result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Last path segment.
    pub name: String,
    /// Directory or file.
    pub kind: EntryKind,
    /// Payload size, or [`DIRECTORY_SIZE`] for directories.
    pub size: u64,
    /// Commit time for files, listing time for directories.
    pub modified: DateTime<Utc>,
}

impl EntryInfo {
    fn directory(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            size: DIRECTORY_SIZE,
            modified: now,
        }
    }

    /// True for directories.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Unix-style permission bits; everything is reported read-write.
    pub fn mode(&self) -> u32 {
        match self.kind {
            EntryKind::Directory => MODE_RW | MODE_DIR,
            EntryKind::File => MODE_RW,
        }
    }
}

/// Counters exported as metrics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileStoreStats {
    /// Committed files currently stored.
    pub files: usize,
    /// Explicitly created directories.
    pub directories: usize,
    /// Sum of stored payload sizes.
    pub bytes: u64,
    /// Open write sessions.
    pub writers: usize,
    /// Uploads committed since start.
    pub committed: u64,
    /// Files removed by retention since start.
    pub evicted: u64,
}

#[derive(Debug, Default)]
struct Inner {
    directories: BTreeSet<String>,
    files: BTreeMap<String, Arc<VirtualFile>>,
    writers: HashSet<String>,
}

impl Inner {
    fn files_in<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Arc<VirtualFile>> + 'a {
        self.files
            .range(prefix.to_owned()..)
            .take_while(move |(path, _)| path.starts_with(prefix))
            .filter(move |(path, _)| strip_dir(path, prefix).is_some_and(|rest| !rest.contains('/')))
            .map(|(_, file)| file)
    }

    fn has_files_below(&self, prefix: &str) -> bool {
        self.files
            .range(prefix.to_owned()..)
            .next()
            .is_some_and(|(path, _)| path.starts_with(prefix))
    }
}

/// In-memory, retention-bounded file tree shared by every upload session.
#[derive(Debug)]
pub struct VirtualFileStore {
    retain: usize,
    clock: SharedClock,
    inner: RwLock<Inner>,
    seq: AtomicU64,
    committed: AtomicU64,
    evicted: AtomicU64,
}

impl VirtualFileStore {
    /// Store keeping at most `retain` files per directory.
    pub fn new(retain: usize, clock: SharedClock) -> Self {
        Self {
            retain: retain.max(1),
            clock,
            inner: RwLock::new(Inner::default()),
            seq: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Files kept per directory.
    pub fn retain_per_directory(&self) -> usize {
        self.retain
    }

    /// Create `path` and every missing ancestor. Idempotent.
    pub fn create_directory(&self, path: &str) {
        let path = normalize(path);
        let mut inner = self.inner.write();
        for dir in ancestors(&path) {
            if inner.directories.insert(dir.to_owned()) {
                debug!(directory = dir, "directory created");
            }
        }
    }

    /// True for the root, explicitly created directories and directories
    /// implied by a committed file below them.
    pub fn directory_exists(&self, path: &str) -> bool {
        let path = normalize(path);
        if path == "/" {
            return true;
        }
        let inner = self.inner.read();
        inner.directories.contains(&path) || inner.has_files_below(&dir_prefix(&path))
    }

    /// Immediate entries of `dir`: subdirectories by name, then committed
    /// files oldest-created first.
    pub fn list_children(&self, dir: &str) -> Vec<EntryInfo> {
        let prefix = dir_prefix(dir);
        let now = self.clock.now();
        let inner = self.inner.read();

        let mut subdirs = BTreeSet::new();
        for known in &inner.directories {
            if let Some(rest) = strip_dir(known, &prefix) {
                if !rest.contains('/') {
                    subdirs.insert(rest.to_owned());
                }
            }
        }
        for path in inner.files.keys() {
            if let Some((segment, _)) = strip_dir(path, &prefix).and_then(|rest| rest.split_once('/')) {
                subdirs.insert(segment.to_owned());
            }
        }

        let mut files: Vec<&Arc<VirtualFile>> = inner.files_in(&prefix).collect();
        files.sort_by_key(|file| file.order_key());

        subdirs
            .into_iter()
            .map(|name| EntryInfo::directory(name, now))
            .chain(files.into_iter().map(|file| file.info()))
            .collect()
    }

    /// Start a write session for `path` owned by `device`.
    ///
    /// The containing directory is swept before the session starts. Without
    /// `append` the file currently at `path` is removed; with `append` the
    /// session starts from its content. Only one session per path may be open.
    pub fn open_for_write(
        self: &Arc<Self>,
        path: &str,
        append: bool,
        device: Arc<Device>,
    ) -> Result<WriteHandle> {
        let path = normalize(path);
        if path == "/" {
            return Err(FileStoreError::PermissionDenied(path));
        }
        let mut inner = self.inner.write();
        if inner.writers.contains(&path) {
            return Err(FileStoreError::WriteInProgress(path));
        }
        self.sweep_locked(&mut inner, parent(&path));

        let now = self.clock.now();
        let existing = if append {
            inner.files.get(&path).cloned()
        } else {
            inner.files.remove(&path);
            None
        };
        let (created, seq, buffer) = match existing {
            Some(file) => (file.created, file.seq, BytesMut::from(&file.payload[..])),
            None => (now, self.seq.fetch_add(1, Ordering::Relaxed), BytesMut::new()),
        };
        inner.writers.insert(path.clone());
        debug!(path = %path, device = %device.name(), append, "write session opened");

        Ok(WriteHandle {
            store: self.clone(),
            path,
            device,
            created,
            seq,
            buffer,
            open: true,
        })
    }

    /// Commit the session's content, then sweep its directory.
    ///
    /// The file keeps the creation time of its session start, so an upload
    /// that began before the directory's newest `retain` files is evicted as
    /// soon as it commits.
    pub fn close_write(&self, mut handle: WriteHandle) -> Result<EntryInfo> {
        handle.open = false;
        let payload = std::mem::take(&mut handle.buffer).freeze();
        let file = Arc::new(VirtualFile {
            path: handle.path.clone(),
            device: handle.device.clone(),
            created: handle.created,
            modified: self.clock.now(),
            seq: handle.seq,
            payload,
        });
        let info = file.info();

        let mut inner = self.inner.write();
        inner.writers.remove(&file.path);
        inner.files.insert(file.path.clone(), file.clone());
        self.committed.fetch_add(1, Ordering::Relaxed);
        info!(path = %file.path, device = %file.device.name(), size = file.size(), "upload committed");
        self.sweep_locked(&mut inner, parent(&file.path));
        Ok(info)
    }

    /// Reader over a committed file.
    pub fn open_for_read(&self, path: &str) -> Result<ReadHandle> {
        let path = normalize(path);
        let file = self
            .inner
            .read()
            .files
            .get(&path)
            .cloned()
            .ok_or(FileStoreError::NotFound(path))?;
        Ok(ReadHandle::new(file))
    }

    /// File info if a file lives at `path`, else directory info, else NotFound.
    pub fn stat(&self, path: &str) -> Result<EntryInfo> {
        let path = normalize(path);
        if let Some(file) = self.inner.read().files.get(&path) {
            return Ok(file.info());
        }
        if self.directory_exists(&path) {
            let name = if path == "/" { "/" } else { file_name(&path) };
            return Ok(EntryInfo::directory(name, self.clock.now()));
        }
        Err(FileStoreError::NotFound(path))
    }

    /// Always denied.
    pub fn delete(&self, path: &str) -> Result<()> {
        Err(FileStoreError::PermissionDenied(normalize(path)))
    }

    /// Always denied.
    pub fn rename(&self, from: &str, _to: &str) -> Result<()> {
        Err(FileStoreError::PermissionDenied(normalize(from)))
    }

    /// Always denied.
    pub fn chmod(&self, path: &str, _mode: u32) -> Result<()> {
        Err(FileStoreError::PermissionDenied(normalize(path)))
    }

    /// Newest committed file uploaded by the named device.
    pub fn latest_for_device(&self, device: &str) -> Option<Arc<VirtualFile>> {
        self.inner
            .read()
            .files
            .values()
            .filter(|file| file.device.name() == device)
            .max_by_key(|file| file.order_key())
            .cloned()
    }

    /// Current counters.
    pub fn stats(&self) -> FileStoreStats {
        let inner = self.inner.read();
        FileStoreStats {
            files: inner.files.len(),
            directories: inner.directories.len(),
            bytes: inner.files.values().map(|file| file.size()).sum(),
            writers: inner.writers.len(),
            committed: self.committed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }

    fn sweep_locked(&self, inner: &mut Inner, dir: &str) -> usize {
        let prefix = dir_prefix(dir);
        let candidates = inner
            .files_in(&prefix)
            .map(|file| RetentionCandidate {
                path: file.path.as_str(),
                created: file.created,
                seq: file.seq,
            })
            .collect();
        let evict: Vec<String> = select_evictions(candidates, self.retain)
            .into_iter()
            .map(str::to_owned)
            .collect();
        for path in &evict {
            inner.files.remove(path);
            debug!(path = %path, "retention evicted file");
        }
        self.evicted.fetch_add(evict.len() as u64, Ordering::Relaxed);
        evict.len()
    }

    fn release_writer(&self, path: &str) {
        if self.inner.write().writers.remove(path) {
            debug!(path, "write session abandoned");
        }
    }
}

/// Open upload session. Commit with [`VirtualFileStore::close_write`];
/// dropping it discards the content and frees the path.
#[derive(Debug)]
pub struct WriteHandle {
    store: Arc<VirtualFileStore>,
    path: String,
    device: Arc<Device>,
    created: DateTime<Utc>,
    seq: u64,
    buffer: BytesMut,
    open: bool,
}

impl WriteHandle {
    /// Path the session writes to.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True before the first write.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Commit into the owning store.
    pub fn commit(self) -> Result<EntryInfo> {
        let store = self.store.clone();
        store.close_write(self)
    }
}

impl io::Write for WriteHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        if self.open {
            self.store.release_writer(&self.path);
        }
    }
}

/// Sequential reader over a committed file.
#[derive(Debug)]
pub struct ReadHandle {
    file: Arc<VirtualFile>,
    cursor: io::Cursor<Bytes>,
}

impl ReadHandle {
    fn new(file: Arc<VirtualFile>) -> Self {
        let cursor = io::Cursor::new(file.payload());
        Self { file, cursor }
    }

    /// File being read.
    pub fn file(&self) -> &Arc<VirtualFile> {
        &self.file
    }
}

impl io::Read for ReadHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.cursor, buf)
    }
}
