//! # fugue-chain
//!
//! The chain ingestion and canonical-chain engine. The [`Blockchain`]
//! accepts externally supplied headers and blocks, validates them against a
//! pluggable [`Verifier`] and [`Executor`], persists them through
//! `fugue-storage`, and maintains the canonical chain under the
//! total-difficulty fork-choice rule - reorganising when a heavier side
//! branch appears.
//!
//! Ingestion is serialised by a writer lock; readers run concurrently
//! against immutable head snapshots. Committed chain changes are fanned out
//! on an append-only [`EventStream`].

#![warn(missing_docs)]
#![warn(clippy::all)]

mod blockchain;
mod error;
mod event;
mod mock;

pub use blockchain::{BlockResult, Blockchain, ChainConfig, Executor, Verifier};
pub use error::{ChainError, ChainResult};
pub use event::{Event, EventKind, EventStream, Subscription};
pub use mock::{MockExecutor, MockVerifier};
