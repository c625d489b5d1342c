//! Local cache & synchronization engine for remote Calibre libraries.
//!
//! Every library gets its own namespace on local disk: a catalog replica,
//! a directory of covers, and its share of the ephemeral downloads. Nothing
//! is shared between libraries except the scratch directory, whose file
//! names carry the library's key.
//!
//! [`Shelf`] ties the pieces together; each piece is usable on its own.

pub mod covers;
pub mod downloads;
pub mod error;
pub mod janitor;
mod layout;
pub mod library;
pub mod registry;
mod shelf;
pub mod sync;
pub mod tasks;
pub mod warmup;

pub use crate::layout::Layout;
pub use crate::library::{Library, LibraryId};
pub use crate::shelf::{Options, Shelf};
