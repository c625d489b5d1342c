//! Everything wired together.

use crate::covers::{self, CoverCache};
use crate::downloads::Downloads;
use crate::error::{ErrorKind, Result};
use crate::janitor::{self, Janitor, Sweep};
use crate::layout::Layout;
use crate::library::{Library, LibraryId};
use crate::registry::Registry;
use crate::sync::{SyncState, Synchronizer};
use crate::tasks;
use crate::warmup::{self, WarmUp, WarmUpScheduler};
use shelf_catalog::{Item, ItemId};
use shelf_storage::{BackendHandle, CredentialsHandle, RemoteRoot};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tunables of a [`Shelf`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Private storage root holding the registry, replicas, covers and downloads.
    pub root: PathBuf,
    /// Covers fetched concurrently by one warm-up pass.
    pub concurrency: usize,
    /// Time a download may go unused before the janitor deletes it.
    pub expiration: Duration,
    /// Time between janitor sweeps.
    pub interval: Duration,
}

impl Options {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            concurrency: warmup::DEFAULT_CONCURRENCY,
            expiration: janitor::DEFAULT_EXPIRATION,
            interval: janitor::DEFAULT_INTERVAL,
        }
    }
}

/// The cache engine of every configured library.
pub struct Shelf {
    backend: BackendHandle,
    registry: Registry,
    sync: Synchronizer,
    covers: CoverCache,
    warm_up: WarmUpScheduler,
    downloads: Downloads,
    janitor: Arc<Janitor>,
    janitor_interval: Duration,
}

impl Shelf {
    /// Open the storage root, creating it if needed and removing anything
    /// left half-written by an earlier run.
    pub fn open(options: Options, backend: BackendHandle, credentials: CredentialsHandle) -> Result<Self> {
        let layout = Layout::new(options.root);
        layout.prepare()?;
        let registry = Registry::open(layout.registry_path())?;
        let covers = CoverCache::new(layout.clone());
        Ok(Self {
            registry,
            sync: Synchronizer::new(backend.clone(), layout.clone()),
            warm_up: WarmUpScheduler::new(backend.clone(), covers.clone(), credentials, options.concurrency),
            downloads: Downloads::new(backend.clone(), &layout),
            janitor: Arc::new(Janitor::new(layout.downloads_dir(), options.expiration)),
            janitor_interval: options.interval,
            covers,
            backend,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn covers(&self) -> &CoverCache {
        &self.covers
    }

    pub fn library(&self, id: &LibraryId) -> Result<Library> {
        self.registry.get(id).ok_or_else(|| exn::Exn::from(ErrorKind::UnknownLibrary(id.clone())))
    }

    pub fn current(&self) -> Option<Library> {
        self.registry.current()
    }

    /// Replace a library's settings. Returns `false` if the id is unknown or
    /// another library already uses the new location.
    ///
    /// Moving a library to another folder or link drops its replica and
    /// covers, which described the old location.
    pub async fn update_library(&self, library: Library) -> Result<bool> {
        let Some(previous) = self.registry.get(&library.id) else {
            return Ok(false);
        };
        let moved = !previous.same_location(&library);
        if !self.registry.update(library.clone())? {
            return Ok(false);
        }
        if moved {
            tracing::info!(library = %library.id, "Library moved; dropping cached data");
            self.warm_up.cancel(&library.id);
            self.sync.clear(Some(&library.id)).await?;
            self.covers.clear(Some(&library.id)).await?;
        }
        Ok(true)
    }

    /// Register a library at `root`. Returns `None` if one already exists there.
    pub fn add_library(&self, root: RemoteRoot, name: Option<String>) -> Result<Option<Library>> {
        let library = Library::new(LibraryId::generate(), root, name);
        Ok(self.registry.add(library.clone())?.then(|| library))
    }

    /// Forget a library along with its replica and covers.
    pub async fn remove_library(&self, id: &LibraryId) -> Result<bool> {
        if !self.registry.remove(id)? {
            return Ok(false);
        }
        self.warm_up.cancel(id);
        self.sync.clear(Some(id)).await?;
        self.covers.clear(Some(id)).await?;
        Ok(true)
    }

    /// Make `id` current. Warm-up passes of every other library stop.
    pub fn switch_to(&self, id: &LibraryId) -> Result<bool> {
        if !self.registry.set_current(id)? {
            return Ok(false);
        }
        self.warm_up.cancel_others(id);
        Ok(true)
    }

    /// Make sure the catalog of `id` is ready and list its items.
    ///
    /// A non-empty load kicks off a cover warm-up pass, whose outcome is
    /// returned alongside the items.
    pub async fn load(&self, id: &LibraryId, force: bool) -> Result<(Vec<Item>, WarmUp)> {
        let library = self.library(id)?;
        let items = self.sync.ensure_ready(&library, force).await?;
        let warm_up = self.warm_up.start(library, items.clone());
        Ok((items, warm_up))
    }

    /// [`load()`](Self::load) the current library.
    pub async fn load_current(&self, force: bool) -> Result<Option<(Vec<Item>, WarmUp)>> {
        match self.current() {
            Some(library) => Ok(Some(self.load(&library.id, force).await?)),
            None => Ok(None),
        }
    }

    /// Delete the replica of `id` and download it again.
    pub async fn re_download(&self, id: &LibraryId) -> Result<Vec<Item>> {
        let library = self.library(id)?;
        self.sync.re_download(&library).await
    }

    pub fn sync_state(&self, id: &LibraryId) -> SyncState {
        self.sync.state(id)
    }

    /// Cover of an item, fetched and cached on a miss.
    pub async fn cover(&self, id: &LibraryId, item: &Item) -> Result<Option<Vec<u8>>> {
        let library = self.library(id)?;
        covers::read_through(&self.backend, &self.covers, &library, item).await
    }

    /// Download (or reuse) a content file of an item; returns its local path.
    pub async fn open_file(&self, id: &LibraryId, item: ItemId, format: &str) -> Result<PathBuf> {
        let library = self.library(id)?;
        let item = self
            .sync
            .item(&library, item)
            .await?
            .ok_or_else(|| ErrorKind::UnknownItem(item))?;
        self.downloads.open(&library, &item, format).await
    }

    /// One janitor pass over the downloads, now.
    pub async fn sweep(&self) -> Result<Sweep> {
        self.janitor.sweep().await
    }

    /// Sweep now and then every [`Options::interval`] until `cancel` fires.
    pub fn spawn_janitor(&self, cancel: CancellationToken) -> JoinHandle<()> {
        tasks::spawn_recurring(self.janitor.clone(), self.janitor_interval, cancel)
    }

    /// Drop the replica and covers of one library, or of all of them.
    pub async fn clear(&self, id: Option<&LibraryId>) -> Result<()> {
        match id {
            Some(id) => {
                self.warm_up.cancel(id);
            },
            None => self.warm_up.cancel_all(),
        }
        self.sync.clear(id).await?;
        self.covers.clear(id).await
    }

    /// Close every replica and delete all cached data, as on sign-out.
    pub async fn clear_all(&self) -> Result<()> {
        self.clear(None).await
    }
}
