use crate::error::{Error, ErrorKind};
use crate::models::{Format, Item, ItemId};
use exn::ResultExt;

#[derive(sqlx::FromRow)]
pub(crate) struct BookRow {
    pub(crate) id: i64,
    title: String,
    path: String,
    has_cover: bool,
    description: Option<String>,
}
impl BookRow {
    /// Combine the book with the author and format rows belonging to it.
    pub(crate) fn into_item(self, authors: Vec<String>, formats: Vec<Format>) -> Item {
        Item {
            id: self.id,
            title: self.title,
            authors: (!authors.is_empty()).then(|| authors.join(" & ")),
            path: self.path,
            has_cover: self.has_cover,
            formats,
            description: self.description.filter(|d| !d.trim().is_empty()),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AuthorRow {
    pub(crate) book: ItemId,
    pub(crate) name: String,
}

#[derive(sqlx::FromRow)]
pub(crate) struct FormatRow {
    pub(crate) book: ItemId,
    format: String,
    name: String,
    uncompressed_size: i64,
}
impl TryFrom<FormatRow> for Format {
    type Error = Error;
    fn try_from(row: FormatRow) -> Result<Self, Self::Error> {
        Ok(Self {
            format: row.format,
            name: row.name,
            size: u64::try_from(row.uncompressed_size).or_raise(|| ErrorKind::InvalidData("format size"))?,
        })
    }
}
