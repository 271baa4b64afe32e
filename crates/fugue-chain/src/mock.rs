//! Trivial verifier and executor implementations.
//!
//! Used by the test suites and by tooling that drives the engine without a
//! real consensus or execution backend.

use crate::blockchain::{BlockResult, Executor, Verifier};
use crate::error::ChainResult;
use fugue_primitives::H256;
use fugue_types::{Block, Header, Receipt, TxStatus};

/// A verifier that accepts every header.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockVerifier;

impl Verifier for MockVerifier {
    fn verify_header(&self, _parent: &Header, _header: &Header) -> ChainResult<()> {
        Ok(())
    }
}

/// An executor that performs no state transition: it emits one successful
/// receipt per transaction and echoes the header's state root and gas
/// usage, so any structurally consistent block passes the post-execution
/// checks.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockExecutor;

impl Executor for MockExecutor {
    fn process_block(&self, _parent_root: H256, block: &Block) -> ChainResult<BlockResult> {
        let mut cumulative = 0u64;
        let receipts: Vec<Receipt> = block
            .transactions
            .iter()
            .map(|tx| {
                cumulative = cumulative.saturating_add(tx.gas);
                Receipt::new(TxStatus::Success, cumulative, vec![])
            })
            .collect();
        Ok(BlockResult {
            receipts,
            state_root: block.header.state_root,
            total_gas: block.header.gas_used,
        })
    }
}
