//! Transaction record

use bytes::Bytes;
use fugue_crypto::keccak256;
use fugue_primitives::{Address, H256};

/// A signed transaction. Signature verification is the executor's concern;
/// the chain engine only carries the fields and the content hash.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Transaction {
    /// Sender nonce
    pub nonce: u64,
    /// Gas price offered, in wei per gas
    pub gas_price: u64,
    /// Gas limit for this transaction
    pub gas: u64,
    /// Recipient; `None` for contract creation
    pub to: Option<Address>,
    /// Transferred value, in wei
    pub value: u128,
    /// Call data or init code
    pub input: Bytes,
    /// Signature recovery id
    pub v: u64,
    /// Signature r
    pub r: H256,
    /// Signature s
    pub s: H256,
    /// Cached content hash (not part of the pre-image)
    pub hash: H256,
}

impl Transaction {
    /// Recompute the cached `hash` from the RLP pre-image.
    pub fn compute_hash(&mut self) -> &mut Self {
        self.hash = keccak256(&rlp::encode(self));
        self
    }

    /// True when the transaction creates a contract.
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}
