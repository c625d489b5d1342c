mod item;
mod row;

pub use self::item::{Format, Item, ItemId};
pub(crate) use self::row::{AuthorRow, BookRow, FormatRow};
