//! Key-value backends.
//!
//! One handle, two backends: RocksDB when the node is given a data
//! directory, an in-memory ordered map otherwise. Both expose the same
//! column-family operations and atomic batch writes.

use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options,
    WriteBatch,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Column family names, one per record kind.
pub mod cf {
    /// Headers by hash
    pub const HEADERS: &str = "headers";
    /// Block bodies by header hash
    pub const BODIES: &str = "bodies";
    /// Execution receipts by header hash
    pub const RECEIPTS: &str = "receipts";
    /// Total difficulty by header hash
    pub const DIFFICULTY: &str = "difficulty";
    /// Canonical hash by block number
    pub const CANONICAL: &str = "canonical";
    /// Containing block hash by transaction hash
    pub const TX_LOOKUP: &str = "tx_lookup";
    /// Head pointers and the fork-tip set
    pub const META: &str = "meta";
}

/// All column family names.
pub const ALL_CFS: &[&str] = &[
    cf::HEADERS,
    cf::BODIES,
    cf::RECEIPTS,
    cf::DIFFICULTY,
    cf::CANONICAL,
    cf::TX_LOOKUP,
    cf::META,
];

type RocksDb = DBWithThreadMode<MultiThreaded>;

enum Backend {
    Rocks(RocksDb),
    Memory(BTreeMap<&'static str, BTreeMap<Vec<u8>, Vec<u8>>>),
}

/// Database handle with column family support. Cloning shares the
/// underlying backend.
pub struct Database {
    inner: Arc<RwLock<Option<Backend>>>,
    path: Option<String>,
}

impl Database {
    /// Create a RocksDB-backed database rooted at `path` (not yet opened).
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            path: Some(path.as_ref().to_string_lossy().into_owned()),
        }
    }

    /// Create an in-memory database (not yet opened).
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            path: None,
        }
    }

    /// Open the database, creating it (and any missing column families) as
    /// needed.
    pub fn open(&self) -> StorageResult<()> {
        let mut guard = self.inner.write();
        if guard.is_some() {
            return Err(StorageError::AlreadyOpen);
        }

        let backend = match &self.path {
            Some(path) => {
                std::fs::create_dir_all(path)?;
                let mut opts = Options::default();
                opts.create_if_missing(true);
                opts.create_missing_column_families(true);

                let descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
                    .iter()
                    .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
                    .collect();
                Backend::Rocks(RocksDb::open_cf_descriptors(&opts, path, descriptors)?)
            }
            None => Backend::Memory(ALL_CFS.iter().map(|name| (*name, BTreeMap::new())).collect()),
        };

        *guard = Some(backend);
        Ok(())
    }

    /// Close the database. In-memory contents are dropped.
    pub fn close(&self) {
        *self.inner.write() = None;
    }

    /// True while the database is open.
    pub fn is_open(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Read a value from a column family.
    pub fn get(&self, cf_name: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let guard = self.inner.read();
        match guard.as_ref().ok_or(StorageError::NotOpen)? {
            Backend::Rocks(db) => {
                let cf = rocks_cf(db, cf_name)?;
                Ok(db.get_cf(&cf, key)?)
            }
            Backend::Memory(families) => Ok(memory_cf(families, cf_name)?.get(key).cloned()),
        }
    }

    /// Write a value to a column family.
    pub fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut guard = self.inner.write();
        match guard.as_mut().ok_or(StorageError::NotOpen)? {
            Backend::Rocks(db) => {
                let cf = rocks_cf(db, cf_name)?;
                db.put_cf(&cf, key, value)?;
                Ok(())
            }
            Backend::Memory(families) => {
                memory_cf_mut(families, cf_name)?.insert(key.to_vec(), value.to_vec());
                Ok(())
            }
        }
    }

    /// Delete a value from a column family.
    pub fn delete(&self, cf_name: &str, key: &[u8]) -> StorageResult<()> {
        let mut guard = self.inner.write();
        match guard.as_mut().ok_or(StorageError::NotOpen)? {
            Backend::Rocks(db) => {
                let cf = rocks_cf(db, cf_name)?;
                db.delete_cf(&cf, key)?;
                Ok(())
            }
            Backend::Memory(families) => {
                memory_cf_mut(families, cf_name)?.remove(key);
                Ok(())
            }
        }
    }

    /// Start a write batch.
    pub fn batch(&self) -> Batch {
        Batch::new()
    }

    /// Apply a batch atomically, in operation order.
    pub fn write_batch(&self, batch: Batch) -> StorageResult<()> {
        let mut guard = self.inner.write();
        match guard.as_mut().ok_or(StorageError::NotOpen)? {
            Backend::Rocks(db) => {
                let mut rocks_batch = WriteBatch::default();
                for op in &batch.ops {
                    match op {
                        BatchOp::Put { cf, key, value } => {
                            let handle = rocks_cf(db, cf)?;
                            rocks_batch.put_cf(&handle, key, value);
                        }
                        BatchOp::Delete { cf, key } => {
                            let handle = rocks_cf(db, cf)?;
                            rocks_batch.delete_cf(&handle, key);
                        }
                    }
                }
                db.write(rocks_batch)?;
                Ok(())
            }
            Backend::Memory(families) => {
                // validate first so a bad family leaves the map untouched
                for op in &batch.ops {
                    memory_cf(families, op.cf())?;
                }
                for op in batch.ops {
                    match op {
                        BatchOp::Put { cf, key, value } => {
                            memory_cf_mut(families, &cf)?.insert(key, value);
                        }
                        BatchOp::Delete { cf, key } => {
                            memory_cf_mut(families, &cf)?.remove(&key);
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// The on-disk path, if this is a RocksDB-backed database.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            path: self.path.clone(),
        }
    }
}

fn rocks_cf<'a>(db: &'a RocksDb, name: &str) -> StorageResult<Arc<BoundColumnFamily<'a>>> {
    db.cf_handle(name)
        .ok_or_else(|| StorageError::InvalidColumnFamily(name.to_string()))
}

fn memory_cf<'a>(
    families: &'a BTreeMap<&'static str, BTreeMap<Vec<u8>, Vec<u8>>>,
    name: &str,
) -> StorageResult<&'a BTreeMap<Vec<u8>, Vec<u8>>> {
    families
        .get(name)
        .ok_or_else(|| StorageError::InvalidColumnFamily(name.to_string()))
}

fn memory_cf_mut<'a>(
    families: &'a mut BTreeMap<&'static str, BTreeMap<Vec<u8>, Vec<u8>>>,
    name: &str,
) -> StorageResult<&'a mut BTreeMap<Vec<u8>, Vec<u8>>> {
    families
        .get_mut(name)
        .ok_or_else(|| StorageError::InvalidColumnFamily(name.to_string()))
}

enum BatchOp {
    Put {
        cf: String,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        cf: String,
        key: Vec<u8>,
    },
}

impl BatchOp {
    fn cf(&self) -> &str {
        match self {
            BatchOp::Put { cf, .. } | BatchOp::Delete { cf, .. } => cf,
        }
    }
}

/// A group of writes applied atomically by [`Database::write_batch`].
#[derive(Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Queue a put.
    pub fn put(&mut self, cf: &str, key: &[u8], value: &[u8]) {
        self.ops.push(BatchOp::Put {
            cf: cf.to_string(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Queue a delete.
    pub fn delete(&mut self, cf: &str, key: &[u8]) {
        self.ops.push(BatchOp::Delete {
            cf: cf.to_string(),
            key: key.to_vec(),
        });
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
