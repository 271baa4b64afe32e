//! Execution receipt records

use bytes::Bytes;
use fugue_primitives::{Address, H256};

use crate::header::Bloom;

/// Outcome of a transaction's execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    /// Execution reverted or ran out of gas
    Failure = 0,
    /// Execution succeeded
    Success = 1,
}

impl From<bool> for TxStatus {
    fn from(success: bool) -> Self {
        if success {
            TxStatus::Success
        } else {
            TxStatus::Failure
        }
    }
}

/// Log entry emitted during execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics
    pub topics: Vec<H256>,
    /// Non-indexed payload
    pub data: Bytes,
}

impl Log {
    /// Create a log entry.
    pub fn new(address: Address, topics: Vec<H256>, data: Bytes) -> Self {
        Self {
            address,
            topics,
            data,
        }
    }

    /// Bloom over the emitting address and topics.
    pub fn bloom(&self) -> Bloom {
        let mut bloom = Bloom::default();
        bloom.accrue(self.address.as_bytes());
        for topic in &self.topics {
            bloom.accrue(topic.as_bytes());
        }
        bloom
    }
}

/// Receipt for one transaction, identified by its position in the body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Execution outcome
    pub status: TxStatus,
    /// Gas used by the block up to and including this transaction
    pub cumulative_gas_used: u64,
    /// Bloom over `logs`
    pub logs_bloom: Bloom,
    /// Logs emitted by this transaction
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Create a receipt, deriving the bloom from the logs.
    pub fn new(status: TxStatus, cumulative_gas_used: u64, logs: Vec<Log>) -> Self {
        let mut logs_bloom = Bloom::default();
        for log in &logs {
            logs_bloom.accrue_bloom(&log.bloom());
        }
        Self {
            status,
            cumulative_gas_used,
            logs_bloom,
            logs,
        }
    }

    /// True when execution succeeded.
    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }
}
