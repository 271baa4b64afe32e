//! # fugue-crypto
//!
//! Content addressing for FugueLedger. Every persisted record is identified
//! by the Keccak-256 digest of its canonical encoding.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod hash;

pub use hash::keccak256;
