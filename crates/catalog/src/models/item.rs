use std::path::PathBuf;

/// Catalog id of an item (Calibre's `books.id`).
pub type ItemId = i64;

/// Name of the cover image inside every item folder.
const COVER_FILE: &str = "cover.jpg";

/// A single catalog record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    /// All authors in catalog order, joined with `" & "`.
    pub authors: Option<String>,
    /// Folder of the item, relative to the library root.
    pub path: String,
    pub has_cover: bool,
    pub formats: Vec<Format>,
    pub description: Option<String>,
}

impl Item {
    /// Cover image path relative to the library root.
    ///
    /// ```
    /// # use shelf_catalog::Item;
    /// # let item = Item { id: 1, title: "Dune".into(), authors: None, path: "Frank Herbert/Dune (1)".into(), has_cover: true, formats: vec![], description: None };
    /// assert_eq!(item.cover_path(), std::path::Path::new("Frank Herbert/Dune (1)/cover.jpg"));
    /// ```
    pub fn cover_path(&self) -> PathBuf {
        PathBuf::from(&self.path).join(COVER_FILE)
    }

    /// Look up an available format, ignoring case (`"epub"` finds `EPUB`).
    pub fn format(&self, format: &str) -> Option<&Format> {
        self.formats.iter().find(|f| f.format.eq_ignore_ascii_case(format))
    }

    /// Content file path of `format` relative to the library root.
    pub fn format_path(&self, format: &Format) -> PathBuf {
        PathBuf::from(&self.path).join(format.file_name())
    }
}

/// One available content file of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Format name as Calibre records it (`EPUB`, `PDF`, ...).
    pub format: String,
    /// File name without extension.
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: u64,
}

impl Format {
    /// File name on the remote: `<name>.<format lowercased>`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.extension())
    }

    pub fn extension(&self) -> String {
        self.format.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn item() -> Item {
        Item {
            id: 7,
            title: "The Left Hand of Darkness".to_string(),
            authors: Some("Ursula K. Le Guin".to_string()),
            path: "Ursula K. Le Guin/The Left Hand of Darkness (7)".to_string(),
            has_cover: true,
            formats: vec![Format {
                format: "EPUB".to_string(),
                name: "The Left Hand of Darkness - Ursula K. Le Guin".to_string(),
                size: 301_422,
            }],
            description: None,
        }
    }

    #[test]
    fn test_format_lookup_ignores_case() {
        let item = item();
        assert!(item.format("epub").is_some());
        assert!(item.format("Epub").is_some());
        assert!(item.format("pdf").is_none());
    }

    #[test]
    fn test_format_path() {
        let item = item();
        let format = item.format("EPUB").unwrap();
        assert_eq!(
            item.format_path(format),
            Path::new("Ursula K. Le Guin/The Left Hand of Darkness (7)/The Left Hand of Darkness - Ursula K. Le Guin.epub")
        );
    }
}
