//! Local catalog replicas.
//!
//! A library's catalog is the Calibre `metadata.db` SQLite file sitting at
//! the root of the remote library folder. This crate never writes to it: the
//! synchronizer downloads a copy (the replica) and this crate answers "list
//! all items" against that copy.
//!
//! # Architecture
//! - [`Replica`]: a read-only connection pool over one replica file. Handles
//!   are owned by whoever synchronizes the file, and must be closed before the
//!   file underneath is replaced or deleted.
//! - [`Repository`]: the queries, returning [`Item`]s in catalog id order.

pub mod error;
#[cfg(any(test, feature = "fixture"))]
pub mod fixture;
mod models;
mod replica;
mod repo;

pub use crate::models::{Format, Item, ItemId};
pub use crate::replica::Replica;
pub use crate::repo::Repository;

/// File name of the catalog at the root of every remote library.
pub const CATALOG_FILE: &str = "metadata.db";
