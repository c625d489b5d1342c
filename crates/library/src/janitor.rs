//! Expiry of ephemeral downloads.

use crate::error::{ErrorKind, Result};
use crate::tasks::RecurringTask;
use async_trait::async_trait;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Default time a download may go unused before it is deleted.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(48 * 60 * 60);
/// Default time between sweeps.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Tally of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    pub deleted: u64,
    pub retained: u64,
    pub failed: u64,
}

/// Deletes files from the scratch directory once they expire.
///
/// Only ever looks at the one directory it was given; covers and catalog
/// replicas live elsewhere and are never touched.
#[derive(Debug, Clone)]
pub struct Janitor {
    dir: PathBuf,
    expiration: Duration,
}

impl Janitor {
    pub fn new(dir: impl Into<PathBuf>, expiration: Duration) -> Self {
        Self { dir: dir.into(), expiration }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sweep with the configured expiration, as of now.
    pub async fn sweep(&self) -> Result<Sweep> {
        self.sweep_at(SystemTime::now(), self.expiration).await
    }

    /// Delete every file last modified more than `expiration` before `now`.
    ///
    /// A file exactly `expiration` old is kept, as is a file with a
    /// modification time in the future. Files that cannot be inspected or
    /// deleted are logged and counted, and the sweep carries on; only an
    /// unreadable directory fails the sweep.
    pub async fn sweep_at(&self, now: SystemTime, expiration: Duration) -> Result<Sweep> {
        let mut sweep = Sweep::default();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(sweep),
            Err(err) => return Err(err).or_raise(|| ErrorKind::LocalStorage(self.dir.clone())),
        };
        while let Some(entry) = entries.next_entry().await.or_raise(|| ErrorKind::LocalStorage(self.dir.clone()))? {
            let path = entry.path();
            let modified = match entry.metadata().await {
                Ok(metadata) if !metadata.is_file() => continue,
                Ok(metadata) => metadata.modified(),
                Err(err) => Err(err),
            };
            let age = match modified {
                Ok(modified) => now.duration_since(modified).unwrap_or(Duration::ZERO),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "Could not inspect download");
                    sweep.failed += 1;
                    continue;
                },
            };
            if age <= expiration {
                sweep.retained += 1;
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => sweep.deleted += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "Could not delete expired download");
                    sweep.failed += 1;
                },
            }
        }
        Ok(sweep)
    }
}

#[async_trait]
impl RecurringTask for Janitor {
    fn name(&self) -> &str {
        "janitor"
    }

    async fn run(&self) {
        match self.sweep().await {
            Ok(sweep) => tracing::info!(
                deleted = sweep.deleted,
                retained = sweep.retained,
                failed = sweep.failed,
                "Swept ephemeral downloads"
            ),
            Err(err) => tracing::warn!(error = ?err, "Sweep of ephemeral downloads failed"),
        }
    }
}
