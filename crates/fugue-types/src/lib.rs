//! # fugue-types
//!
//! The chain data model and its canonical encodings:
//! - [`Header`], [`Body`], [`Block`] - the chain records
//! - [`Transaction`], [`Receipt`], [`Log`] - the payload records
//! - [`codec`] - the deterministic RLP encoding of every persisted record
//!   and of the hash pre-images used for content addressing
//! - [`root`] - Merkle root builders over transactions, uncles and receipts
//!
//! Record identity is the Keccak-256 digest of the record's RLP encoding;
//! [`Header::compute_hash`] and [`Transaction::compute_hash`] fill the
//! cached `hash` field from the pre-image.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
mod header;
mod receipt;
pub mod root;
mod transaction;

pub use header::{Block, Body, Bloom, Header};
pub use receipt::{Log, Receipt, TxStatus};
pub use root::{EMPTY_ROOT, EMPTY_UNCLES_HASH};
pub use transaction::Transaction;
