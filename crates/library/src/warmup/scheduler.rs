use crate::covers::CoverCache;
use crate::library::{Library, LibraryId};
use crate::warmup::{Summary, WarmUpEvent, warm_up};
use futures::StreamExt;
use shelf_catalog::Item;
use shelf_storage::{BackendHandle, CredentialsHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type Running = Arc<Mutex<HashMap<LibraryId, (u64, CancellationToken)>>>;

/// Outcome of [`WarmUpScheduler::start()`].
#[derive(Debug)]
pub enum WarmUp {
    /// A pass is running; the handle resolves to its summary.
    Spawned(JoinHandle<Summary>),
    /// A pass for this library is still running; it was left alone.
    AlreadyRunning,
    /// The remote cannot be reached with valid credentials right now.
    CredentialsUnavailable,
    /// The catalog is empty.
    NothingToDo,
}

/// Runs warm-up passes as background tasks, at most one per library.
#[derive(Clone)]
pub struct WarmUpScheduler {
    backend: BackendHandle,
    covers: CoverCache,
    credentials: CredentialsHandle,
    concurrency: usize,
    running: Running,
    generation: Arc<std::sync::atomic::AtomicU64>,
}

/// Removes a pass from the running set when its task ends, however it ends.
struct Registration {
    running: Running,
    library: LibraryId,
    generation: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        // A cancelled pass may outlive its entry; never remove a successor's.
        if running.get(&self.library).is_some_and(|(generation, _)| *generation == self.generation) {
            running.remove(&self.library);
        }
    }
}

impl WarmUpScheduler {
    pub fn new(backend: BackendHandle, covers: CoverCache, credentials: CredentialsHandle, concurrency: usize) -> Self {
        Self {
            backend,
            covers,
            credentials,
            concurrency: concurrency.max(1),
            running: Arc::default(),
            generation: Arc::default(),
        }
    }

    fn running(&self) -> std::sync::MutexGuard<'_, HashMap<LibraryId, (u64, CancellationToken)>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a pass over `items` for `library`, unless one is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, library: Library, items: Vec<Item>) -> WarmUp {
        if items.is_empty() {
            return WarmUp::NothingToDo;
        }
        if !self.credentials.is_available() {
            tracing::info!(library = %library.id, "Credentials unavailable; not warming up covers");
            return WarmUp::CredentialsUnavailable;
        }
        let cancel = CancellationToken::new();
        let generation = self.generation.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        {
            let mut running = self.running();
            if running.contains_key(&library.id) {
                tracing::debug!(library = %library.id, "Cover warm-up already running");
                return WarmUp::AlreadyRunning;
            }
            running.insert(library.id.clone(), (generation, cancel.clone()));
        }
        let registration = Registration {
            running: self.running.clone(),
            library: library.id.clone(),
            generation,
        };
        let backend = self.backend.clone();
        let covers = self.covers.clone();
        let concurrency = self.concurrency;
        WarmUp::Spawned(tokio::spawn(async move {
            let _registration = registration;
            let mut events = std::pin::pin!(warm_up(&backend, &covers, &library, &items, concurrency, &cancel));
            let mut summary = Summary::default();
            while let Some(event) = events.next().await {
                if let WarmUpEvent::Complete(complete) = event {
                    summary = complete;
                }
            }
            tracing::info!(
                library = %library.id,
                fetched = summary.fetched,
                skipped = summary.skipped,
                cached = summary.cached,
                cancelled = summary.cancelled,
                "Cover warm-up finished"
            );
            summary
        }))
    }

    pub fn is_running(&self, library: &LibraryId) -> bool {
        self.running().contains_key(library)
    }

    /// Cancel the pass of `library`, if any. Returns whether one was running.
    pub fn cancel(&self, library: &LibraryId) -> bool {
        match self.running().remove(library) {
            Some((_, cancel)) => {
                cancel.cancel();
                true
            },
            None => false,
        }
    }

    /// Cancel every pass except the one for `keep`.
    pub fn cancel_others(&self, keep: &LibraryId) {
        self.running().retain(|library, (_, cancel)| {
            let retain = library == keep;
            if !retain {
                cancel.cancel();
            }
            retain
        });
    }

    pub fn cancel_all(&self) {
        for (_, (_, cancel)) in self.running().drain() {
            cancel.cancel();
        }
    }
}
