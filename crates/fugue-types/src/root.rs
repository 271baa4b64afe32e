//! Merkle root builders.
//!
//! The roots carried by a header commit to the body's transactions and
//! uncles and to the execution receipts. The construction is a hash tree
//! over indexed leaves: leaf *i* is the Keccak-256 of the RLP-encoded index
//! concatenated with the RLP-encoded record; interior nodes hash the
//! concatenation of their children, with an odd tail promoted unchanged.
//! Identical logical input always yields the identical 32-byte root.

use fugue_crypto::keccak256;
use fugue_primitives::H256;
use rlp::Encodable;

use crate::header::Header;
use crate::receipt::Receipt;
use crate::transaction::Transaction;

/// Root of an empty transaction or receipt list: keccak256 of the empty
/// RLP string.
pub const EMPTY_ROOT: H256 = H256::from_bytes([
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8,
    0x6e, 0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63,
    0xb4, 0x21,
]);

/// Root of an empty uncle list: keccak256 of the empty RLP list.
pub const EMPTY_UNCLES_HASH: H256 = H256::from_bytes([
    0x1d, 0xcc, 0x4d, 0xe8, 0xde, 0xc7, 0x5d, 0x7a, 0xab, 0x85, 0xb5, 0x67, 0xb6, 0xcc, 0xd4,
    0x1a, 0xd3, 0x12, 0x45, 0x1b, 0x94, 0x8a, 0x74, 0x13, 0xf0, 0xa1, 0x42, 0xfd, 0x40, 0xd4,
    0x93, 0x47,
]);

fn indexed_leaf<E: Encodable>(index: u64, item: &E) -> H256 {
    let mut preimage = rlp::encode(&index).to_vec();
    preimage.extend_from_slice(&rlp::encode(item));
    keccak256(&preimage)
}

fn fold(mut nodes: Vec<H256>) -> H256 {
    while nodes.len() > 1 {
        let mut next = Vec::with_capacity(nodes.len().div_ceil(2));
        for pair in nodes.chunks(2) {
            match pair {
                [left, right] => {
                    let mut preimage = [0u8; 64];
                    preimage[..32].copy_from_slice(left.as_bytes());
                    preimage[32..].copy_from_slice(right.as_bytes());
                    next.push(keccak256(&preimage));
                }
                [odd] => next.push(*odd),
                _ => unreachable!(),
            }
        }
        nodes = next;
    }
    nodes[0]
}

fn ordered_root<E: Encodable>(items: &[E], empty: H256) -> H256 {
    if items.is_empty() {
        return empty;
    }
    fold(
        items
            .iter()
            .enumerate()
            .map(|(i, item)| indexed_leaf(i as u64, item))
            .collect(),
    )
}

/// Root over a body's transactions.
pub fn transactions_root(transactions: &[Transaction]) -> H256 {
    ordered_root(transactions, EMPTY_ROOT)
}

/// Root over a body's uncle headers.
pub fn uncles_root(uncles: &[Header]) -> H256 {
    ordered_root(uncles, EMPTY_UNCLES_HASH)
}

/// Root over a block's execution receipts.
pub fn receipts_root(receipts: &[Receipt]) -> H256 {
    ordered_root(receipts, EMPTY_ROOT)
}
