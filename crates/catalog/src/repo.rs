//! Item queries over a catalog replica.
//!
//! Books, their authors and their formats live in separate tables; each list
//! is fetched with one query and stitched together here, which keeps the SQL
//! trivial and avoids `GROUP_CONCAT` ordering surprises.

use crate::Replica;
use crate::error::{ErrorKind, Result};
use crate::models::{AuthorRow, BookRow, Format, FormatRow, Item, ItemId};
use exn::ResultExt;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::instrument;

/// Group rows by the book they belong to, preserving row order within a book.
fn group_by_book<R, T>(rows: Vec<R>, book: impl Fn(&R) -> ItemId, convert: impl Fn(R) -> Result<T>) -> Result<HashMap<ItemId, Vec<T>>> {
    let mut map: HashMap<ItemId, Vec<T>> = HashMap::new();
    for row in rows {
        let id = book(&row);
        map.entry(id).or_default().push(convert(row)?);
    }
    Ok(map)
}

/// Queries against one catalog replica.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Replica> for Repository {
    fn from(replica: &Replica) -> Self {
        Self { pool: replica.pool().clone() }
    }
}
impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List every item in the catalog, in catalog id order.
    ///
    /// The order is the catalog's insertion order and is stable between calls;
    /// any user-facing sorting happens on top of it.
    #[instrument("listing catalog items", skip(self))]
    pub async fn list_items(&self) -> Result<Vec<Item>> {
        let books: Vec<BookRow> = sqlx::query_as(include_str!("../queries/list_books.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let authors: Vec<AuthorRow> = sqlx::query_as(include_str!("../queries/list_authors.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let formats: Vec<FormatRow> = sqlx::query_as(include_str!("../queries/list_formats.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;

        let mut authors = group_by_book(authors, |row| row.book, |row| Ok(row.name))?;
        let mut formats = group_by_book(formats, |row| row.book, Format::try_from)?;
        let items = books
            .into_iter()
            .map(|book| {
                let id = book.id;
                book.into_item(authors.remove(&id).unwrap_or_default(), formats.remove(&id).unwrap_or_default())
            })
            .collect::<Vec<_>>();
        tracing::debug!(count = items.len(), "Listed catalog items");
        Ok(items)
    }

    /// Get a single item by catalog id.
    pub async fn get_item(&self, id: ItemId) -> Result<Option<Item>> {
        let book: Option<BookRow> = sqlx::query_as(include_str!("../queries/get_book.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let Some(book) = book else {
            return Ok(None);
        };
        let authors: Vec<AuthorRow> = sqlx::query_as(include_str!("../queries/get_authors.sql"))
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let formats: Vec<FormatRow> = sqlx::query_as(include_str!("../queries/get_formats.sql"))
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let authors = authors.into_iter().map(|row| row.name).collect();
        let formats = formats.into_iter().map(Format::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Some(book.into_item(authors, formats)))
    }

    pub async fn count_items(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_books.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("book count"))
    }
}
