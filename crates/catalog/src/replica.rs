//! Read-only connection pool over a replica file.

use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::Repository;
use crate::error::{ErrorKind, Result};

// List queries run one after the other; a second connection covers a
// cover-rendering lookup arriving mid-list.
const MAX_CONNECTIONS: u32 = 2;
/// Tables the item queries read from.
const REQUIRED_TABLES: i64 = 5;

/// Handle to an opened catalog replica.
///
/// The file is opened read-only and `immutable`: SQLite takes no locks and
/// creates no journal files next to it, which also means it will not notice
/// if the file changes underneath. [`close()`](Self::close) the handle before
/// replacing the file.
#[derive(Debug, Clone)]
pub struct Replica {
    pool: SqlitePool,
    path: PathBuf,
}

impl Replica {
    /// Open the replica at `path`.
    ///
    /// The file must already exist and be a SQLite database with the catalog
    /// schema; a garbage or truncated file is reported here rather than on the
    /// first query.
    #[instrument("opening catalog replica", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .immutable(true)
            .create_if_missing(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Open(path.to_path_buf()))?;
        let replica = Self { pool, path: path.to_path_buf() };
        if let Err(err) = replica.check_schema().await {
            replica.close().await;
            return Err(err);
        }
        Ok(replica)
    }

    async fn check_schema(&self) -> Result<()> {
        let tables: i64 = sqlx::query_scalar(include_str!("../queries/check_schema.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Open(self.path.clone()))?;
        if tables < REQUIRED_TABLES {
            exn::bail!(ErrorKind::Open(self.path.clone()));
        }
        Ok(())
    }

    /// Path of the replica file this handle reads.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn repository(&self) -> Repository {
        Repository::from(self)
    }

    /// Close the connection pool.
    ///
    /// Waits for checked-out connections to be returned. Clones of this handle
    /// share the pool and are closed too.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
