//! In-memory storage backend for testing.

use super::Sink;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::path::validate as validate_path;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use time::UtcDateTime;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

type Objects = HashMap<PathBuf, (UtcDateTime, Vec<u8>)>;

/// In-memory storage backend for testing.
///
/// Objects live in a `HashMap` behind a [`RwLock`]. Every `stat` and `read`
/// is counted, so tests can assert on remote traffic, and failures can be
/// injected per path or for the whole remote.
///
/// # Examples
///
/// ```
/// use shelf_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("/Library/metadata.db", b"catalog")]);
/// assert_eq!(backend.read(Path::new("/Library/metadata.db")).await?, b"catalog");
/// assert_eq!(backend.read_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    objects: RwLock<Objects>,
    links: HashMap<String, PathBuf>,
    denied: RwLock<HashSet<PathBuf>>,
    offline: AtomicBool,
    stat_unavailable: AtomicBool,
    read_delay: Option<Duration>,
    stats: AtomicUsize,
    reads: AtomicUsize,
}

impl MockBackend {
    /// Create a mock backend pre-populated with objects.
    ///
    /// Panics if any path fails validation; broken test setup should not
    /// produce a passing test.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let now = UtcDateTime::now();
        let mut objects = HashMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            objects.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            objects: RwLock::new(objects),
            links: HashMap::new(),
            denied: RwLock::new(HashSet::new()),
            offline: AtomicBool::new(false),
            stat_unavailable: AtomicBool::new(false),
            read_delay: None,
            stats: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a shared link resolving to `folder`.
    pub fn with_shared_link(mut self, link: impl Into<String>, folder: impl AsRef<Path>) -> Self {
        let Ok(folder) = validate_path(folder.as_ref()) else {
            panic!("MockBackend::with_shared_link: invalid folder {}", folder.as_ref().display());
        };
        self.links.insert(link.into(), folder);
        self
    }

    /// Every read sleeps this long before producing data, which keeps a
    /// download "in flight" long enough for concurrency tests.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Insert or replace an object, stamping it with the current time.
    pub async fn put(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) {
        self.put_modified(path, data, UtcDateTime::now()).await;
    }

    /// Insert or replace an object with an explicit modification time.
    pub async fn put_modified(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>, modified: UtcDateTime) {
        let Ok(path) = validate_path(path.as_ref()) else {
            panic!("MockBackend::put_modified: invalid path {}", path.as_ref().display());
        };
        self.objects.write().await.insert(path, (modified, data.into()));
    }

    pub async fn remove(&self, path: impl AsRef<Path>) {
        if let Ok(path) = validate_path(path.as_ref()) {
            self.objects.write().await.remove(&path);
        }
    }

    /// Make every operation on `path` fail with `PermissionDenied`.
    pub async fn deny(&self, path: impl AsRef<Path>) {
        if let Ok(path) = validate_path(path.as_ref()) {
            self.denied.write().await.insert(path);
        }
    }

    /// Simulate losing connectivity: every operation fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Simulate a remote that serves reads but cannot answer `stat`.
    pub fn set_stat_unavailable(&self, unavailable: bool) {
        self.stat_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn stat_count(&self) -> usize {
        self.stats.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn shared_path(&self, link: &str, path: &Path) -> Result<PathBuf> {
        let folder = self.links.get(link).ok_or_else(|| ErrorKind::InvalidLink(link.to_string()))?;
        Ok(folder.join(validate_path(path)?))
    }

    async fn check_access(&self, requested: &Path, key: &Path) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Network(format!("{} is offline", self.name)));
        }
        if self.denied.read().await.contains(key) {
            exn::bail!(ErrorKind::PermissionDenied(requested.to_path_buf()));
        }
        Ok(())
    }

    async fn stat_key(&self, requested: &Path, key: PathBuf) -> Result<FileInfo> {
        self.stats.fetch_add(1, Ordering::SeqCst);
        if self.stat_unavailable.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Network("metadata endpoint unavailable".to_string()));
        }
        self.check_access(requested, &key).await?;
        let guard = self.objects.read().await;
        let (modified, data) = guard.get(&key).ok_or_else(|| ErrorKind::NotFound(requested.to_path_buf()))?;
        Ok(FileInfo::new(requested, data.len() as u64, *modified))
    }

    async fn read_key(&self, requested: &Path, key: PathBuf, sink: &mut Sink<'_>) -> Result<u64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_access(requested, &key).await?;
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        // Clone out of the lock; never hold it across the sink's await points.
        let data = {
            let guard = self.objects.read().await;
            guard.get(&key).map(|(_, data)| data.clone()).ok_or_else(|| ErrorKind::NotFound(requested.to_path_buf()))?
        };
        sink.write_all(&data).await.map_err(ErrorKind::Io)?;
        Ok(data.len() as u64)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &[u8]); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.stat_key(path, validate_path(path)?).await
    }

    async fn stat_shared(&self, link: &str, path: &Path) -> Result<FileInfo> {
        self.stat_key(path, self.shared_path(link, path)?).await
    }

    async fn read_into(&self, path: &Path, sink: &mut Sink<'_>) -> Result<u64> {
        self.read_key(path, validate_path(path)?, sink).await
    }

    async fn read_shared_into(&self, link: &str, path: &Path, sink: &mut Sink<'_>) -> Result<u64> {
        self.read_key(path, self.shared_path(link, path)?, sink).await
    }
}
