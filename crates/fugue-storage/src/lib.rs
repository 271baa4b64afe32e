//! # fugue-storage
//!
//! Persistence for the chain engine:
//! - [`Database`] - a byte-keyed, byte-valued store with named column
//!   families and atomic batched writes, backed by RocksDB on disk or an
//!   in-memory ordered map
//! - [`ChainDb`] - the typed facade for the domain records (headers,
//!   bodies, receipts, total difficulty, canonical index, head pointers,
//!   transaction lookups, fork tips)
//!
//! Absence of a record is `Option::None`, never an error; [`StorageError`]
//! covers I/O failures and corrupt data only.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod chain;
mod db;
mod error;

pub use chain::ChainDb;
pub use db::{cf, Batch, Database, ALL_CFS};
pub use error::{StorageError, StorageResult};
