//! Chain engine error types

use fugue_primitives::H256;
use fugue_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the chain engine. Missing records are reported as
/// `Option::None` by the read operations, not through this type.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A batch is not internally consecutive
    #[error("invalid batch at index {index}: {reason}")]
    InvalidBatch {
        /// Position of the offending entry
        index: usize,
        /// What was inconsistent
        reason: &'static str,
    },

    /// The first block of a batch has no stored parent
    #[error("parent {0} not found")]
    UnknownParent(H256),

    /// The verifier rejected a header
    #[error("header verification failed: {0}")]
    VerificationFailed(String),

    /// The executor failed to process a block
    #[error("block execution failed: {0}")]
    ExecutionFailed(String),

    /// The executor's result disagrees with the header
    #[error("execution mismatch: {0}")]
    ExecutionMismatch(&'static str),

    /// A body root disagrees with the header
    #[error("body root mismatch: {0}")]
    BodyRootMismatch(&'static str),

    /// A storage invariant is violated; the engine should be treated as
    /// tainted
    #[error("corrupt store: {0}")]
    CorruptStore(String),

    /// The stored genesis disagrees with the configured genesis
    #[error("stored genesis does not match the configured genesis")]
    GenesisMismatch,

    /// Storage failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
