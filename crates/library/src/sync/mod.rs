//! Catalog synchronization.
//!
//! Produces a queryable local replica of a library's catalog while keeping
//! remote traffic to a minimum. Each library gets a slot holding its open
//! [`Replica`] handle behind an async mutex, so at most one synchronization
//! per library is ever in flight; a caller arriving mid-download waits for
//! it and then reuses the handle it produced.
//!
//! A replica is published with a single rename of a fully written, non-empty
//! temporary file. Readers see the previous snapshot or the new one, never
//! a mix.

mod state;

pub use self::state::SyncState;
use crate::error::{ErrorKind, Result};
use crate::layout::{Layout, PART_SUFFIX, remove_file_if_exists};
use crate::library::{Library, LibraryId};
use exn::ResultExt;
use shelf_catalog::{Item, ItemId, Replica};
use shelf_storage::BackendHandle;
use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::NamedTempFile;
use time::UtcDateTime;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::instrument;

struct Slot {
    replica: AsyncMutex<Option<Replica>>,
    state: watch::Sender<SyncState>,
}

impl Slot {
    fn new() -> Self {
        Self {
            replica: AsyncMutex::new(None),
            state: watch::Sender::new(SyncState::Absent),
        }
    }

    fn set(&self, state: SyncState) {
        self.state.send_replace(state);
    }
}

/// Size and modification time of the local replica file.
struct LocalReplica {
    size: u64,
    modified: UtcDateTime,
}

/// Owns every library's replica file and open handle.
pub struct Synchronizer {
    backend: BackendHandle,
    layout: Layout,
    slots: Mutex<HashMap<LibraryId, Arc<Slot>>>,
}

impl Synchronizer {
    pub fn new(backend: BackendHandle, layout: Layout) -> Self {
        Self {
            backend,
            layout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, library: &LibraryId) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(library.clone()).or_insert_with(|| Arc::new(Slot::new())).clone()
    }

    fn existing_slots(&self, library: Option<&LibraryId>) -> Vec<Arc<Slot>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut selected = slots.iter().filter(|(id, _)| library.is_none_or(|wanted| *id == wanted)).collect::<Vec<_>>();
        // Always lock in the same order.
        selected.sort_by(|(a, _), (b, _)| a.cmp(b));
        selected.into_iter().map(|(_, slot)| slot.clone()).collect()
    }

    /// Path of the replica file for `library`, whether or not it exists.
    pub fn replica_path(&self, library: &LibraryId) -> PathBuf {
        self.layout.catalog_path(library)
    }

    pub fn state(&self, library: &LibraryId) -> SyncState {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(library).map(|slot| *slot.state.borrow()).unwrap_or_default()
    }

    /// Watch state transitions of `library`.
    pub fn subscribe(&self, library: &LibraryId) -> watch::Receiver<SyncState> {
        self.slot(library).state.subscribe()
    }

    /// Make sure a replica is available and list its items.
    ///
    /// With an open handle and no `force`, the handle is reused without
    /// asking the remote anything. Otherwise the local file is checked
    /// against the remote's metadata: it is kept when sizes match or it is
    /// at least as new. If the remote cannot be asked, the local file is
    /// used anyway. `force` always downloads.
    #[instrument("synchronizing catalog", skip_all, fields(library = %library.id, force))]
    pub async fn ensure_ready(&self, library: &Library, force: bool) -> Result<Vec<Item>> {
        let slot = self.slot(&library.id);
        let mut guard = slot.replica.lock().await;
        let replica = self.open(library, &slot, &mut guard, force).await?;
        replica.repository().list_items().await.or_raise(|| ErrorKind::Catalog)
    }

    /// Look up one item, synchronizing first if no handle is open.
    pub async fn item(&self, library: &Library, item: ItemId) -> Result<Option<Item>> {
        let slot = self.slot(&library.id);
        let mut guard = slot.replica.lock().await;
        let replica = self.open(library, &slot, &mut guard, false).await?;
        replica.repository().get_item(item).await.or_raise(|| ErrorKind::Catalog)
    }

    /// Discard the replica and fetch it again.
    ///
    /// Unlike a forced [`ensure_ready()`](Self::ensure_ready), the existing
    /// file is deleted *before* the download; if the download fails the
    /// library is left without a replica.
    #[instrument("re-downloading catalog", skip_all, fields(library = %library.id))]
    pub async fn re_download(&self, library: &Library) -> Result<Vec<Item>> {
        let slot = self.slot(&library.id);
        let mut guard = slot.replica.lock().await;
        if let Some(replica) = guard.take() {
            replica.close().await;
        }
        remove_file_if_exists(&self.layout.catalog_path(&library.id)).await?;
        slot.set(SyncState::Absent);
        let replica = self.open(library, &slot, &mut guard, true).await?;
        replica.repository().list_items().await.or_raise(|| ErrorKind::Catalog)
    }

    /// Close handles and delete replica files, of one library or of all.
    pub async fn clear(&self, library: Option<&LibraryId>) -> Result<()> {
        let slots = self.existing_slots(library);
        let mut guards = Vec::with_capacity(slots.len());
        for slot in &slots {
            let mut guard = slot.replica.lock().await;
            if let Some(replica) = guard.take() {
                replica.close().await;
            }
            slot.set(SyncState::Absent);
            guards.push(guard);
        }
        match library {
            Some(id) => remove_file_if_exists(&self.layout.catalog_path(id)).await?,
            None => remove_files_in(&self.layout.catalogs_dir()).await?,
        }
        tracing::info!(library = ?library.map(LibraryId::as_str), "Cleared catalog replicas");
        Ok(())
    }

    /// Walk the state machine until a handle is open, and borrow it.
    async fn open<'g>(
        &self,
        library: &Library,
        slot: &Slot,
        guard: &'g mut Option<Replica>,
        force: bool,
    ) -> Result<&'g Replica> {
        let path = self.layout.catalog_path(&library.id);
        if force || guard.is_none() {
            slot.set(SyncState::StaleCheck);
            let download = match force {
                true => true,
                false => match local_replica(&path).await {
                    Ok(Some(local)) => !self.is_fresh(library, &local).await,
                    Ok(None) => true,
                    Err(err) => {
                        slot.set(SyncState::Failed);
                        return Err(err);
                    },
                },
            };
            if download {
                slot.set(SyncState::Downloading);
                let published = match self.download(library).await {
                    Ok(temp) => {
                        if let Some(previous) = guard.take() {
                            previous.close().await;
                        }
                        temp.persist(&path).map(drop).or_raise(|| ErrorKind::LocalStorage(path.clone()))
                    },
                    Err(err) => Err(err),
                };
                if let Err(err) = published {
                    slot.set(SyncState::Failed);
                    return Err(err);
                }
            }
        }
        let replica = match guard.take() {
            Some(replica) => replica,
            None => match Replica::open(&path).await {
                Ok(replica) => replica,
                Err(err) => {
                    slot.set(SyncState::Failed);
                    return Err(err.raise(ErrorKind::Catalog));
                },
            },
        };
        slot.set(SyncState::Ready);
        Ok(guard.insert(replica))
    }

    /// Compare the local replica with the remote catalog's metadata.
    ///
    /// Size equality counts as fresh even if timestamps differ. Any failure
    /// to ask counts as fresh too: an existing replica beats no replica.
    async fn is_fresh(&self, library: &Library, local: &LocalReplica) -> bool {
        let remote = match library.catalog_location() {
            Ok(location) => self.backend.stat_at(&location).await,
            Err(err) => Err(err),
        };
        match remote {
            Ok(remote) => {
                let fresh = local.size == remote.size || local.modified >= remote.modified;
                tracing::debug!(
                    local_size = local.size,
                    remote_size = remote.size,
                    local_modified = ?local.modified,
                    remote_modified = ?remote.modified,
                    fresh,
                    "Compared catalog replica with remote"
                );
                fresh
            },
            Err(err) => {
                tracing::warn!(error = ?err, "Could not check catalog freshness; using local replica");
                true
            },
        }
    }

    /// Stream the remote catalog into a temporary file next to the replica.
    ///
    /// The returned file is complete and non-empty; dropping it deletes it.
    async fn download(&self, library: &Library) -> Result<NamedTempFile> {
        let shared = library.is_shared();
        let location = library.catalog_location().map_err(|err| ErrorKind::remote(err, shared))?;
        let dir = self.layout.catalogs_dir();
        let failed = || ErrorKind::LocalStorage(dir.clone());
        tokio::fs::create_dir_all(&dir).await.or_raise(failed)?;
        let temp = tempfile::Builder::new().prefix(".metadata_").suffix(PART_SUFFIX).tempfile_in(&dir).or_raise(failed)?;
        let mut file = tokio::fs::File::from_std(temp.reopen().or_raise(failed)?);
        let written = self.backend.read_at(&location, &mut file).await.map_err(|err| ErrorKind::remote(err, shared))?;
        file.flush().await.or_raise(failed)?;
        file.sync_all().await.or_raise(failed)?;
        if written == 0 {
            exn::bail!(ErrorKind::RemoteDataInvalid(location.to_string()));
        }
        tracing::info!(bytes = written, backend = self.backend.name(), "Downloaded catalog");
        Ok(temp)
    }
}

/// Metadata of the local replica; `None` when it is missing or empty.
async fn local_replica(path: &Path) -> Result<Option<LocalReplica>> {
    let failed = || ErrorKind::LocalStorage(path.to_path_buf());
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).or_raise(failed),
    };
    if metadata.len() == 0 {
        return Ok(None);
    }
    Ok(Some(LocalReplica {
        size: metadata.len(),
        modified: metadata.modified().or_raise(failed)?.into(),
    }))
}

async fn remove_files_in(dir: &Path) -> Result<()> {
    let failed = || ErrorKind::LocalStorage(dir.to_path_buf());
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err).or_raise(failed),
    };
    while let Some(entry) = entries.next_entry().await.or_raise(failed)? {
        if entry.file_type().await.is_ok_and(|t| t.is_file()) {
            remove_file_if_exists(&entry.path()).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use shelf_catalog::fixture::CatalogFixture;
    use shelf_storage::StorageBackend;
    use shelf_storage::backend::MockBackend;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    const CATALOG: &str = "/Calibre/metadata.db";

    struct Harness {
        _dir: TempDir,
        layout: Layout,
        backend: Arc<MockBackend>,
        sync: Synchronizer,
    }

    impl Harness {
        fn new(backend: MockBackend) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let layout = Layout::new(dir.path());
            layout.prepare().unwrap();
            let backend = Arc::new(backend);
            let sync = Synchronizer::new(backend.clone(), layout.clone());
            Self { _dir: dir, layout, backend, sync }
        }

        async fn with_catalog(books: usize) -> Self {
            let bytes = CatalogFixture::with_books(books).to_bytes().await.unwrap();
            Self::new(MockBackend::with_files([(CATALOG, bytes)]))
        }

        /// A second synchronizer over the same files, with no handles open.
        fn restarted(&self) -> Synchronizer {
            Synchronizer::new(self.backend.clone(), self.layout.clone())
        }

        fn replica_bytes(&self, library: &Library) -> Vec<u8> {
            std::fs::read(self.layout.catalog_path(&library.id)).unwrap()
        }
    }

    fn library(id: &str, root: &str) -> Library {
        Library::new(LibraryId::new(id), root.parse().unwrap(), None)
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        std::fs::File::options().write(true).open(path).unwrap().set_modified(time).unwrap();
    }

    #[tokio::test]
    async fn test_first_load_fetches_once() {
        let harness = Harness::with_catalog(10).await;
        let library = library("a", "/Calibre");

        let items = harness.sync.ensure_ready(&library, false).await.unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(harness.backend.read_count(), 1);
        assert_eq!(harness.backend.stat_count(), 0);
        let remote = harness.backend.read(Path::new(CATALOG)).await.unwrap();
        assert_eq!(harness.replica_bytes(&library), remote);
        assert_eq!(harness.sync.state(&library.id), SyncState::Ready);
    }

    #[tokio::test]
    async fn test_open_handle_is_reused() {
        let harness = Harness::with_catalog(10).await;
        let library = library("a", "/Calibre");
        harness.sync.ensure_ready(&library, false).await.unwrap();
        let items = harness.sync.ensure_ready(&library, false).await.unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(harness.backend.read_count(), 1);
        assert_eq!(harness.backend.stat_count(), 0);
    }

    #[tokio::test]
    async fn test_unchanged_remote_is_not_downloaded_again() {
        let harness = Harness::with_catalog(10).await;
        let library = library("a", "/Calibre");
        harness.sync.ensure_ready(&library, false).await.unwrap();

        let restarted = harness.restarted();
        let items = restarted.ensure_ready(&library, false).await.unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(harness.backend.stat_count(), 1);
        assert_eq!(harness.backend.read_count(), 1);
    }

    #[tokio::test]
    async fn test_newer_local_replica_is_fresh() {
        let remote = CatalogFixture::with_books(10).to_bytes().await.unwrap();
        let backend = MockBackend::default();
        backend.put_modified(CATALOG, remote, UtcDateTime::from(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000))).await;
        let harness = Harness::new(backend);
        let library = library("a", "/Calibre");
        CatalogFixture::with_books(2).write(harness.layout.catalog_path(&library.id)).await.unwrap();

        let items = harness.sync.ensure_ready(&library, false).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(harness.backend.read_count(), 0);
    }

    #[tokio::test]
    async fn test_older_local_replica_of_different_size_is_replaced() {
        let harness = Harness::with_catalog(10).await;
        let library = library("a", "/Calibre");
        let path = harness.layout.catalog_path(&library.id);
        std::fs::write(&path, b"stale").unwrap();
        set_mtime(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));

        let items = harness.sync.ensure_ready(&library, false).await.unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(harness.backend.stat_count(), 1);
        assert_eq!(harness.backend.read_count(), 1);
    }

    #[tokio::test]
    async fn test_same_size_counts_as_fresh_even_when_older() {
        let harness = Harness::with_catalog(10).await;
        let library = library("a", "/Calibre");
        harness.sync.ensure_ready(&library, false).await.unwrap();
        set_mtime(&harness.layout.catalog_path(&library.id), SystemTime::UNIX_EPOCH + Duration::from_secs(5));

        let restarted = harness.restarted();
        assert_eq!(restarted.ensure_ready(&library, false).await.unwrap().len(), 10);
        assert_eq!(harness.backend.stat_count(), 1);
        assert_eq!(harness.backend.read_count(), 1);
    }

    #[tokio::test]
    async fn test_stat_failure_keeps_replica_while_reads_work() {
        let harness = Harness::with_catalog(10).await;
        let library = library("a", "/Calibre");
        harness.sync.ensure_ready(&library, false).await.unwrap();

        harness.backend.set_stat_unavailable(true);
        harness.backend.put(CATALOG, CatalogFixture::with_books(12).to_bytes().await.unwrap()).await;
        let restarted = harness.restarted();
        assert_eq!(restarted.ensure_ready(&library, false).await.unwrap().len(), 10);
        assert_eq!(harness.backend.stat_count(), 1);
        assert_eq!(harness.backend.read_count(), 1);

        // A forced refresh does not ask for metadata and still gets through.
        assert_eq!(restarted.ensure_ready(&library, true).await.unwrap().len(), 12);
        assert_eq!(harness.backend.read_count(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_stat_keeps_replica() {
        let harness = Harness::with_catalog(10).await;
        let library = library("a", "/Calibre");
        harness.sync.ensure_ready(&library, false).await.unwrap();
        let before = harness.replica_bytes(&library);

        harness.backend.set_offline(true);
        for _ in 0..3 {
            let restarted = harness.restarted();
            assert_eq!(restarted.ensure_ready(&library, false).await.unwrap().len(), 10);
        }
        assert_eq!(harness.replica_bytes(&library), before);
        assert_eq!(harness.backend.read_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_remote_never_replaces_replica() {
        let harness = Harness::with_catalog(10).await;
        let library = library("a", "/Calibre");
        harness.sync.ensure_ready(&library, false).await.unwrap();
        let before = harness.replica_bytes(&library);

        harness.backend.put(CATALOG, Vec::new()).await;
        let err = harness.sync.ensure_ready(&library, true).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RemoteDataInvalid(_)));
        assert_eq!(harness.sync.state(&library.id), SyncState::Failed);
        assert_eq!(harness.replica_bytes(&library), before);

        // The previous handle is still open and serving.
        assert_eq!(harness.sync.ensure_ready(&library, false).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_empty_remote_on_first_load() {
        let harness = Harness::new(MockBackend::with_files([(CATALOG, Vec::<u8>::new())]));
        let library = library("a", "/Calibre");
        let err = harness.sync.ensure_ready(&library, false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RemoteDataInvalid(_)));
        assert!(!harness.layout.catalog_path(&library.id).exists());
    }

    #[tokio::test]
    async fn test_missing_remote_catalog() {
        let harness = Harness::with_catalog(1).await;
        let library = library("a", "/Wrong Folder");
        let err = harness.sync.ensure_ready(&library, false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RemoteUnavailable(Failure::NotFound { shared: false })));
        assert!(!err.is_retryable());
        assert_eq!(harness.sync.state(&library.id), SyncState::Failed);
    }

    #[tokio::test]
    async fn test_failed_forced_refresh_keeps_replica() {
        let harness = Harness::with_catalog(10).await;
        let library = library("a", "/Calibre");
        harness.sync.ensure_ready(&library, false).await.unwrap();
        let before = harness.replica_bytes(&library);

        harness.backend.set_offline(true);
        let err = harness.sync.ensure_ready(&library, true).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RemoteUnavailable(Failure::Transient { shared: false })));
        assert!(err.is_retryable());
        assert_eq!(harness.replica_bytes(&library), before);
    }

    #[tokio::test]
    async fn test_forced_refresh_downloads() {
        let harness = Harness::with_catalog(10).await;
        let library = library("a", "/Calibre");
        harness.sync.ensure_ready(&library, false).await.unwrap();
        harness.backend.put(CATALOG, CatalogFixture::with_books(12).to_bytes().await.unwrap()).await;

        let items = harness.sync.ensure_ready(&library, true).await.unwrap();
        assert_eq!(items.len(), 12);
        assert_eq!(harness.backend.read_count(), 2);
    }

    #[tokio::test]
    async fn test_re_download_deletes_first() {
        let harness = Harness::with_catalog(10).await;
        let library = library("a", "/Calibre");
        harness.sync.ensure_ready(&library, false).await.unwrap();

        harness.backend.set_offline(true);
        assert!(harness.sync.re_download(&library).await.is_err());
        assert!(!harness.layout.catalog_path(&library.id).exists());

        harness.backend.set_offline(false);
        assert_eq!(harness.sync.re_download(&library).await.unwrap().len(), 10);
        assert!(harness.layout.catalog_path(&library.id).exists());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_download() {
        let bytes = CatalogFixture::with_books(10).to_bytes().await.unwrap();
        let backend = MockBackend::with_files([(CATALOG, bytes)]).with_read_delay(Duration::from_millis(100));
        let harness = Harness::new(backend);
        let library = library("a", "/Calibre");

        let (first, second) = tokio::join!(
            harness.sync.ensure_ready(&library, false),
            harness.sync.ensure_ready(&library, false),
        );
        assert_eq!(first.unwrap().len(), 10);
        assert_eq!(second.unwrap().len(), 10);
        assert_eq!(harness.backend.read_count(), 1);
    }

    #[tokio::test]
    async fn test_clearing_one_library_leaves_others() {
        let bytes = CatalogFixture::with_books(3).to_bytes().await.unwrap();
        let harness = Harness::new(MockBackend::with_files([("/A/metadata.db", bytes.clone()), ("/B/metadata.db", bytes)]));
        let a = library("a", "/A");
        let b = library("b", "/B");
        harness.sync.ensure_ready(&a, false).await.unwrap();
        harness.sync.ensure_ready(&b, false).await.unwrap();

        harness.sync.clear(Some(&a.id)).await.unwrap();
        assert!(!harness.layout.catalog_path(&a.id).exists());
        assert!(harness.layout.catalog_path(&b.id).exists());
        assert_eq!(harness.sync.state(&a.id), SyncState::Absent);
        assert_eq!(harness.sync.state(&b.id), SyncState::Ready);
        assert_eq!(harness.sync.ensure_ready(&b, false).await.unwrap().len(), 3);
        assert_eq!(harness.backend.read_count(), 2);

        harness.sync.clear(None).await.unwrap();
        assert!(!harness.layout.catalog_path(&b.id).exists());
    }

    #[tokio::test]
    async fn test_shared_link_library() {
        let link = "https://www.dropbox.com/scl/fo/abc?rlkey=1";
        let bytes = CatalogFixture::with_books(4).to_bytes().await.unwrap();
        let backend = MockBackend::with_files([("/Shared/Calibre/metadata.db", bytes)]).with_shared_link(link, "/Shared/Calibre");
        let harness = Harness::new(backend);
        let library = library("s", link);
        assert_eq!(harness.sync.ensure_ready(&library, false).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_state_is_observable() {
        let harness = Harness::with_catalog(1).await;
        let library = library("a", "/Calibre");
        let mut states = harness.sync.subscribe(&library.id);
        assert_eq!(*states.borrow(), SyncState::Absent);
        harness.sync.ensure_ready(&library, false).await.unwrap();
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), SyncState::Ready);
    }

    #[tokio::test]
    async fn test_item_lookup() {
        let harness = Harness::with_catalog(5).await;
        let library = library("a", "/Calibre");
        let item = harness.sync.item(&library, 3).await.unwrap().unwrap();
        assert_eq!(item.title, "Book 3");
        assert!(harness.sync.item(&library, 42).await.unwrap().is_none());
        assert_eq!(harness.backend.read_count(), 1);
    }
}
