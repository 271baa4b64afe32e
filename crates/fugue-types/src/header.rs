//! Block header, body and block records

use bytes::Bytes;
use fugue_crypto::keccak256;
use fugue_primitives::{Address, H256};

use crate::transaction::Transaction;

/// Block header. The `hash` field caches the Keccak-256 digest of the RLP
/// pre-image and is excluded from it; call [`Header::compute_hash`] after
/// constructing or decoding a header.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Header {
    /// Hash of the parent header
    pub parent_hash: H256,
    /// Root over the uncle headers of the body
    pub uncles_hash: H256,
    /// Beneficiary of the block reward
    pub coinbase: Address,
    /// State root after executing the block
    pub state_root: H256,
    /// Root over the transactions of the body
    pub tx_root: H256,
    /// Root over the execution receipts
    pub receipts_root: H256,
    /// Aggregate bloom over the receipt logs
    pub logs_bloom: Bloom,
    /// Block difficulty, the fork-choice weight increment
    pub difficulty: u64,
    /// Block height; 0 for genesis
    pub number: u64,
    /// Gas limit for the block
    pub gas_limit: u64,
    /// Gas used by all transactions
    pub gas_used: u64,
    /// Unix timestamp in seconds
    pub timestamp: u64,
    /// Consensus-specific extra data
    pub extra_data: Bytes,
    /// Sealing mix hash
    pub mix_hash: H256,
    /// Sealing nonce
    pub nonce: u64,
    /// Cached content hash (not part of the pre-image)
    pub hash: H256,
}

impl Header {
    /// Recompute the cached `hash` from the RLP pre-image.
    pub fn compute_hash(&mut self) -> &mut Self {
        self.hash = keccak256(&rlp::encode(self));
        self
    }

    /// True for the genesis header.
    pub fn is_genesis(&self) -> bool {
        self.number == 0 && self.parent_hash.is_zero()
    }
}

/// Block body: the transactions and uncle headers referenced by a header's
/// tx root and uncles root.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Body {
    /// Transactions, in execution order
    pub transactions: Vec<Transaction>,
    /// Uncle headers
    pub uncles: Vec<Header>,
}

/// A full block: header plus body payload.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Block {
    /// Block header
    pub header: Header,
    /// Transactions, in execution order
    pub transactions: Vec<Transaction>,
    /// Uncle headers
    pub uncles: Vec<Header>,
}

impl Block {
    /// Assemble a block from its parts.
    pub fn new(header: Header, transactions: Vec<Transaction>, uncles: Vec<Header>) -> Self {
        Self {
            header,
            transactions,
            uncles,
        }
    }

    /// Header hash, the block identity.
    pub fn hash(&self) -> H256 {
        self.header.hash
    }

    /// Block height.
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Parent header hash.
    pub fn parent_hash(&self) -> H256 {
        self.header.parent_hash
    }

    /// The body payload, cloned out of the block.
    pub fn body(&self) -> Body {
        Body {
            transactions: self.transactions.clone(),
            uncles: self.uncles.clone(),
        }
    }
}

/// 2048-bit log bloom filter.
#[derive(Clone, PartialEq, Eq)]
pub struct Bloom(pub [u8; 256]);

impl Default for Bloom {
    fn default() -> Self {
        Bloom([0u8; 256])
    }
}

impl std::fmt::Debug for Bloom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bloom(0x{})", hex_prefix(&self.0))
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

impl Bloom {
    /// The empty filter
    pub const ZERO: Bloom = Bloom([0u8; 256]);

    /// Create from raw filter bytes
    pub fn from_bytes(bytes: [u8; 256]) -> Self {
        Bloom(bytes)
    }

    /// True if no bit is set
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Mix `input` into the filter (three bits per item).
    pub fn accrue(&mut self, input: &[u8]) {
        let hash = keccak256(input);
        let bytes = hash.as_bytes();
        for i in 0..3 {
            let bit = (((bytes[i * 2] as usize) << 8) | bytes[i * 2 + 1] as usize) & 0x7ff;
            self.0[255 - bit / 8] |= 1 << (bit % 8);
        }
    }

    /// True if `input` may have been accrued (false positives possible).
    pub fn contains(&self, input: &[u8]) -> bool {
        let hash = keccak256(input);
        let bytes = hash.as_bytes();
        for i in 0..3 {
            let bit = (((bytes[i * 2] as usize) << 8) | bytes[i * 2 + 1] as usize) & 0x7ff;
            if self.0[255 - bit / 8] & (1 << (bit % 8)) == 0 {
                return false;
            }
        }
        true
    }

    /// Union with another filter.
    pub fn accrue_bloom(&mut self, other: &Bloom) {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a |= b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash_changes_with_content() {
        let mut a = Header::default();
        a.compute_hash();
        let mut b = Header {
            number: 1,
            ..Header::default()
        };
        b.compute_hash();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_hash_field_not_in_preimage() {
        let mut a = Header::default();
        a.compute_hash();
        let first = a.hash;
        // recomputing over a header that already carries a hash must not
        // change the digest
        a.compute_hash();
        assert_eq!(a.hash, first);
    }

    #[test]
    fn test_is_genesis() {
        let mut genesis = Header::default();
        assert!(genesis.is_genesis());
        genesis.number = 1;
        assert!(!genesis.is_genesis());
    }

    #[test]
    fn test_block_accessors() {
        let mut header = Header {
            number: 7,
            parent_hash: H256::from_bytes([0x01; 32]),
            ..Header::default()
        };
        header.compute_hash();
        let block = Block::new(header.clone(), vec![], vec![]);
        assert_eq!(block.number(), 7);
        assert_eq!(block.hash(), header.hash);
        assert_eq!(block.parent_hash(), header.parent_hash);
        assert_eq!(block.body(), Body::default());
    }

    #[test]
    fn test_bloom_accrue_and_contains() {
        let mut bloom = Bloom::default();
        assert!(bloom.is_empty());
        bloom.accrue(b"topic");
        assert!(bloom.contains(b"topic"));
        assert!(!bloom.is_empty());
    }

    #[test]
    fn test_bloom_union() {
        let mut a = Bloom::default();
        a.accrue(b"left");
        let mut b = Bloom::default();
        b.accrue(b"right");
        a.accrue_bloom(&b);
        assert!(a.contains(b"left"));
        assert!(a.contains(b"right"));
    }
}
