//! Small Calibre-shaped catalogs for tests.
//!
//! Only the tables and columns the item queries read are created, using the
//! same names and types as a real `metadata.db`.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Connection, SqliteConnection};
use std::collections::HashMap;
use std::path::Path;

/// One book to be written into a fixture catalog.
#[derive(Debug, Clone)]
pub struct FixtureBook {
    title: String,
    authors: Vec<String>,
    has_cover: bool,
    description: Option<String>,
    formats: Vec<(String, u64)>,
}

impl FixtureBook {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            authors: vec![author.into()],
            has_cover: false,
            description: None,
            formats: Vec::new(),
        }
    }

    /// Add a co-author, listed after the existing ones.
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn cover(mut self) -> Self {
        self.has_cover = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a content file; its name is `<title> - <first author>` like Calibre does.
    pub fn format(mut self, format: impl Into<String>, size: u64) -> Self {
        self.formats.push((format.into(), size));
        self
    }

    /// Folder Calibre would give this book as the `id`th entry.
    pub fn path(&self, id: i64) -> String {
        format!("{}/{} ({id})", self.authors[0], self.title)
    }

    fn file_name(&self) -> String {
        format!("{} - {}", self.title, self.authors[0])
    }
}

/// Builder for a whole catalog.
///
/// Books get ids `1..=n` in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct CatalogFixture {
    books: Vec<FixtureBook>,
}

impl CatalogFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog of `count` books, every one with a cover and an EPUB.
    pub fn with_books(count: usize) -> Self {
        (1..=count).fold(Self::new(), |fixture, n| {
            fixture.book(FixtureBook::new(format!("Book {n}"), format!("Author {n}")).cover().format("EPUB", 1000 + n as u64))
        })
    }

    pub fn book(mut self, book: FixtureBook) -> Self {
        self.books.push(book);
        self
    }

    pub fn books(&self) -> &[FixtureBook] {
        &self.books
    }

    /// Write the catalog to a new SQLite file at `path`.
    pub async fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            // Keep everything in the one file, no `-wal` sidecar.
            .journal_mode(SqliteJournalMode::Delete);
        let mut conn = SqliteConnection::connect_with(&options).await.or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/fixture_schema.sql"))
            .execute(&mut conn)
            .await
            .or_raise(|| ErrorKind::Database)?;

        let mut authors: HashMap<&str, i64> = HashMap::new();
        for (index, book) in self.books.iter().enumerate() {
            let id = i64::try_from(index + 1).or_raise(|| ErrorKind::InvalidData("book id"))?;
            sqlx::query("INSERT INTO books (id, title, path, has_cover) VALUES (?, ?, ?, ?)")
                .bind(id)
                .bind(&book.title)
                .bind(book.path(id))
                .bind(book.has_cover)
                .execute(&mut conn)
                .await
                .or_raise(|| ErrorKind::Database)?;
            for name in &book.authors {
                let next = i64::try_from(authors.len() + 1).or_raise(|| ErrorKind::InvalidData("author id"))?;
                let author = *authors.entry(name.as_str()).or_insert(next);
                if author == next {
                    sqlx::query("INSERT INTO authors (id, name, sort) VALUES (?, ?, ?)")
                        .bind(author)
                        .bind(name)
                        .bind(name)
                        .execute(&mut conn)
                        .await
                        .or_raise(|| ErrorKind::Database)?;
                }
                sqlx::query("INSERT INTO books_authors_link (book, author) VALUES (?, ?)")
                    .bind(id)
                    .bind(author)
                    .execute(&mut conn)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
            }
            if let Some(description) = &book.description {
                sqlx::query("INSERT INTO comments (book, text) VALUES (?, ?)")
                    .bind(id)
                    .bind(description)
                    .execute(&mut conn)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
            }
            for (format, size) in &book.formats {
                let size = i64::try_from(*size).or_raise(|| ErrorKind::InvalidData("format size"))?;
                sqlx::query("INSERT INTO data (book, format, uncompressed_size, name) VALUES (?, ?, ?, ?)")
                    .bind(id)
                    .bind(format)
                    .bind(size)
                    .bind(book.file_name())
                    .execute(&mut conn)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
            }
        }
        conn.close().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// The catalog as the bytes of a `metadata.db` file.
    pub async fn to_bytes(&self) -> Result<Vec<u8>> {
        let dir = tempfile::tempdir().or_raise(|| ErrorKind::Database)?;
        let path = dir.path().join(crate::CATALOG_FILE);
        self.write(&path).await?;
        tokio::fs::read(&path).await.or_raise(|| ErrorKind::Database)
    }
}
