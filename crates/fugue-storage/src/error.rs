//! Storage error types

use thiserror::Error;

/// Storage errors. Missing records are reported as `Option::None` by the
/// read operations, not through this type.
#[derive(Debug, Error)]
pub enum StorageError {
    /// RocksDB error
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// A stored value failed to decode
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Unknown column family
    #[error("invalid column family: {0}")]
    InvalidColumnFamily(String),

    /// Database not open
    #[error("database not open")]
    NotOpen,

    /// Database already open
    #[error("database already open")]
    AlreadyOpen,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
