//! End-to-end scenarios against the chain engine: extension, batches,
//! forks, reorgs, verifier rejection, full-block ingestion, and on-disk
//! re-open behaviour.

use fugue_chain::{
    BlockResult, Blockchain, ChainConfig, ChainError, ChainResult, EventKind, Executor,
    MockExecutor, MockVerifier, Verifier,
};
use fugue_primitives::H256;
use fugue_types::{root, Block, Header, Receipt, Transaction, TxStatus};
use num_bigint::BigUint;
use std::fs;
use std::sync::Arc;

fn genesis() -> Header {
    Header {
        difficulty: 1,
        tx_root: root::EMPTY_ROOT,
        receipts_root: root::EMPTY_ROOT,
        uncles_hash: root::EMPTY_UNCLES_HASH,
        gas_limit: 30_000_000,
        ..Header::default()
    }
}

fn child(parent: &Header, difficulty: u64) -> Header {
    let mut header = Header {
        parent_hash: parent.hash,
        number: parent.number + 1,
        difficulty,
        tx_root: root::EMPTY_ROOT,
        receipts_root: root::EMPTY_ROOT,
        uncles_hash: root::EMPTY_UNCLES_HASH,
        gas_limit: parent.gas_limit,
        timestamp: parent.timestamp + 1,
        ..Header::default()
    };
    header.compute_hash();
    header
}

fn open_memory() -> Blockchain {
    Blockchain::new(
        ChainConfig::in_memory(genesis()),
        Arc::new(MockVerifier),
        Arc::new(MockExecutor),
    )
    .unwrap()
}

fn temp_data_dir() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let cnt = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("/tmp/fugue_chain_test_{}_{}", id, cnt)
}

fn cleanup(path: &str) {
    let _ = fs::remove_dir_all(path);
}

/// Build a block whose header is consistent with its body and with what
/// [`MockExecutor`] will report for it.
fn block_with_txs(parent: &Header, difficulty: u64, txs: Vec<Transaction>) -> Block {
    let mut txs = txs;
    for tx in txs.iter_mut() {
        tx.compute_hash();
    }
    let mut cumulative = 0u64;
    let receipts: Vec<Receipt> = txs
        .iter()
        .map(|tx| {
            cumulative += tx.gas;
            Receipt::new(TxStatus::Success, cumulative, vec![])
        })
        .collect();

    let mut header = child(parent, difficulty);
    header.tx_root = root::transactions_root(&txs);
    header.receipts_root = root::receipts_root(&receipts);
    header.gas_used = cumulative;
    header.compute_hash();

    Block::new(header, txs, vec![])
}

fn tx(nonce: u64) -> Transaction {
    let mut tx = Transaction {
        nonce,
        gas_price: 3,
        gas: 21_000,
        value: 1_000,
        ..Transaction::default()
    };
    tx.compute_hash();
    tx
}

// ==================== Header ingestion scenarios ====================

#[test]
fn test_fresh_open_extend_by_one() {
    let chain = open_memory();
    let mut sub = chain.subscribe();

    let h1 = child(&chain.header(), 2);
    chain.write_headers(vec![h1.clone()]).unwrap();

    assert_eq!(chain.header().hash, h1.hash);
    assert_eq!(chain.current_td(), BigUint::from(3u64));

    let event = sub.try_next().unwrap();
    assert_eq!(event.kind, EventKind::Head);
    assert_eq!(event.new_chain.len(), 1);
    assert_eq!(event.new_chain[0].hash, h1.hash);
    assert!(sub.try_next().is_none());
}

#[test]
fn test_linear_batch_of_three() {
    let chain = open_memory();
    let mut sub = chain.subscribe();

    let h1 = child(&chain.header(), 2);
    let h2 = child(&h1, 2);
    let h3 = child(&h2, 2);
    chain
        .write_headers(vec![h1.clone(), h2.clone(), h3.clone()])
        .unwrap();

    assert_eq!(chain.header().hash, h3.hash);
    assert_eq!(chain.current_td(), BigUint::from(7u64));

    for expected in [&h1, &h2, &h3] {
        let event = sub.try_next().unwrap();
        assert_eq!(event.kind, EventKind::Head);
        assert_eq!(event.new_chain[0].hash, expected.hash);
    }
    assert!(sub.try_next().is_none());
}

#[test]
fn test_lighter_side_branch_forks() {
    let chain = open_memory();
    let h1 = child(&chain.header(), 2);
    let h2 = child(&h1, 2);
    let h3 = child(&h2, 2);
    chain
        .write_headers(vec![h1.clone(), h2.clone(), h3.clone()])
        .unwrap();

    let mut sub = chain.subscribe();
    let side = child(&h1, 1);
    chain.write_headers(vec![side.clone()]).unwrap();

    // head unchanged
    assert_eq!(chain.header().hash, h3.hash);
    assert_eq!(chain.current_td(), BigUint::from(7u64));

    let event = sub.try_next().unwrap();
    assert_eq!(event.kind, EventKind::Fork);
    assert_eq!(event.old_chain.len(), 1);
    assert_eq!(event.old_chain[0].hash, side.hash);
    assert!(event.new_chain.is_empty());

    assert!(chain.get_forks().unwrap().contains(&side.hash));
}

#[test]
fn test_heavier_side_branch_reorgs() {
    let chain = open_memory();
    let h1 = child(&chain.header(), 2);
    let h2 = child(&h1, 2);
    let h3 = child(&h2, 2);
    chain
        .write_headers(vec![h1.clone(), h2.clone(), h3.clone()])
        .unwrap();

    let mut sub = chain.subscribe();
    let b2 = child(&h1, 10);
    let b3 = child(&b2, 10);
    chain.write_headers(vec![b2.clone(), b3.clone()]).unwrap();

    // the heavier branch is now canonical
    assert_eq!(chain.header().hash, b3.hash);
    assert_eq!(
        chain.current_td(),
        BigUint::from(1u64 + 2 + 10 + 10),
    );
    assert_eq!(chain.get_header_by_number(2).unwrap().unwrap().hash, b2.hash);
    assert_eq!(chain.get_header_by_number(3).unwrap().unwrap().hash, b3.hash);
    assert!(chain.get_forks().unwrap().contains(&h3.hash));

    // the pivot header reorganises, the extension advances the head
    let reorg = sub.try_next().unwrap();
    assert_eq!(reorg.kind, EventKind::Reorg);
    let old: Vec<H256> = reorg.old_chain.iter().map(|h| h.hash).collect();
    assert_eq!(old, vec![h3.hash, h2.hash]);
    let new: Vec<H256> = reorg.new_chain.iter().map(|h| h.hash).collect();
    assert_eq!(new, vec![b2.hash]);

    let head = sub.try_next().unwrap();
    assert_eq!(head.kind, EventKind::Head);
    assert_eq!(head.new_chain[0].hash, b3.hash);
    assert!(sub.try_next().is_none());
}

#[test]
fn test_canonical_index_walks_back_to_genesis() {
    let chain = open_memory();
    let h1 = child(&chain.header(), 2);
    let h2 = child(&h1, 2);
    let h3 = child(&h2, 2);
    chain
        .write_headers(vec![h1.clone(), h2.clone(), h3.clone()])
        .unwrap();
    let b2 = child(&h1, 10);
    chain.write_headers(vec![b2]).unwrap();

    // walk parent links from the head; each step must match the canonical
    // index at that height
    let mut cursor = chain.header();
    loop {
        let canonical = chain
            .get_header_by_number(cursor.number)
            .unwrap()
            .unwrap();
        assert_eq!(canonical.hash, cursor.hash);
        assert_eq!(canonical.number, cursor.number);
        if cursor.number == 0 {
            break;
        }
        cursor = chain.get_parent(&cursor).unwrap().unwrap();
    }
    assert_eq!(
        chain.get_header_by_number(0).unwrap().unwrap().hash,
        chain.genesis()
    );
}

// ==================== Verifier and executor scenarios ====================

struct ZeroDifficultyVerifier;

impl Verifier for ZeroDifficultyVerifier {
    fn verify_header(&self, _parent: &Header, header: &Header) -> ChainResult<()> {
        if header.difficulty == 0 {
            return Err(ChainError::VerificationFailed("zero difficulty".to_string()));
        }
        Ok(())
    }
}

#[test]
fn test_verifier_rejection_leaves_store_untouched() {
    let chain = Blockchain::new(
        ChainConfig::in_memory(genesis()),
        Arc::new(ZeroDifficultyVerifier),
        Arc::new(MockExecutor),
    )
    .unwrap();
    let mut sub = chain.subscribe();
    let head_before = chain.header();

    let bad = Block::new(child(&head_before, 0), vec![], vec![]);
    let bad_hash = bad.hash();
    let err = chain.write_blocks(vec![bad]).unwrap_err();

    assert!(matches!(err, ChainError::VerificationFailed(_)));
    assert_eq!(chain.header().hash, head_before.hash);
    assert!(chain.get_header_by_hash(&bad_hash).unwrap().is_none());
    assert!(sub.try_next().is_none());
}

#[test]
fn test_write_blocks_persists_bodies_and_receipts() {
    let chain = open_memory();
    let mut sub = chain.subscribe();

    let b1 = block_with_txs(&chain.header(), 2, vec![tx(0), tx(1)]);
    let b2 = block_with_txs(&b1.header, 2, vec![tx(2)]);
    chain.write_blocks(vec![b1.clone(), b2.clone()]).unwrap();

    assert_eq!(chain.header().hash, b2.hash());

    let body = chain.get_body_by_hash(&b1.hash()).unwrap().unwrap();
    assert_eq!(body.transactions.len(), 2);

    let receipts = chain.get_receipts_by_hash(&b1.hash()).unwrap().unwrap();
    assert_eq!(receipts.len(), 2);
    assert_eq!(receipts[1].cumulative_gas_used, 42_000);

    // every transaction resolves to its containing block
    for (block, txs) in [(&b1, &b1.transactions), (&b2, &b2.transactions)] {
        for tx in txs.iter() {
            assert_eq!(
                chain.read_tx_lookup(&tx.hash).unwrap(),
                Some(block.hash())
            );
        }
    }

    // full block reads attach the body
    let full = chain.get_block_by_number(1, true).unwrap().unwrap();
    assert_eq!(full.transactions.len(), 2);
    let slim = chain.get_block_by_number(1, false).unwrap().unwrap();
    assert!(slim.transactions.is_empty());

    // one Head event per block
    assert_eq!(sub.try_next().unwrap().kind, EventKind::Head);
    assert_eq!(sub.try_next().unwrap().kind, EventKind::Head);
    assert!(sub.try_next().is_none());

    // the gas average followed the two blocks
    assert!(chain.avg_gas_price() > num_bigint::BigInt::from(0));
}

#[test]
fn test_write_blocks_rejects_empty_batch() {
    let chain = open_memory();
    assert!(matches!(
        chain.write_blocks(vec![]).unwrap_err(),
        ChainError::InvalidBatch { .. }
    ));
}

#[test]
fn test_write_blocks_requires_stored_parent() {
    let chain = open_memory();
    let mut stranger = genesis();
    stranger.timestamp = 42;
    stranger.compute_hash();

    let orphan = Block::new(child(&stranger, 2), vec![], vec![]);
    assert!(matches!(
        chain.write_blocks(vec![orphan]).unwrap_err(),
        ChainError::UnknownParent(_)
    ));
}

#[test]
fn test_body_root_mismatch_fails_whole_batch() {
    let chain = open_memory();
    let mut sub = chain.subscribe();

    let good = block_with_txs(&chain.header(), 2, vec![]);
    let mut bad = block_with_txs(&good.header, 2, vec![]);
    // body no longer matches the committed tx root
    bad.transactions = vec![tx(9)];

    let err = chain.write_blocks(vec![good.clone(), bad]).unwrap_err();
    assert!(matches!(err, ChainError::BodyRootMismatch(_)));

    // validation precedes ingestion: not even the good block went in
    assert_eq!(chain.header().number, 0);
    assert!(chain.get_header_by_hash(&good.hash()).unwrap().is_none());
    assert!(sub.try_next().is_none());
}

/// Fails execution at one block height; everything else is passed through
/// to the mock behaviour.
struct TrippingExecutor {
    fail_at: u64,
}

impl Executor for TrippingExecutor {
    fn process_block(&self, parent_root: H256, block: &Block) -> ChainResult<BlockResult> {
        if block.number() == self.fail_at {
            return Err(ChainError::ExecutionFailed("tripped".to_string()));
        }
        MockExecutor.process_block(parent_root, block)
    }
}

#[test]
fn test_mid_batch_failure_keeps_prior_blocks() {
    let chain = Blockchain::new(
        ChainConfig::in_memory(genesis()),
        Arc::new(MockVerifier),
        Arc::new(TrippingExecutor { fail_at: 2 }),
    )
    .unwrap();
    let mut sub = chain.subscribe();

    let b1 = block_with_txs(&chain.header(), 2, vec![]);
    let b2 = block_with_txs(&b1.header, 2, vec![]);
    let err = chain.write_blocks(vec![b1.clone(), b2.clone()]).unwrap_err();

    assert!(matches!(err, ChainError::ExecutionFailed(_)));
    // the first block committed before the batch stopped
    assert_eq!(chain.header().hash, b1.hash());
    assert!(chain.get_header_by_hash(&b2.hash()).unwrap().is_none());
    assert_eq!(sub.try_next().unwrap().new_chain[0].hash, b1.hash());
    assert!(sub.try_next().is_none());
}

struct WrongRootExecutor;

impl Executor for WrongRootExecutor {
    fn process_block(&self, _parent_root: H256, block: &Block) -> ChainResult<BlockResult> {
        Ok(BlockResult {
            receipts: vec![],
            state_root: H256::from_bytes([0xff; 32]),
            total_gas: block.header.gas_used,
        })
    }
}

#[test]
fn test_state_root_disagreement_is_execution_mismatch() {
    let chain = Blockchain::new(
        ChainConfig::in_memory(genesis()),
        Arc::new(MockVerifier),
        Arc::new(WrongRootExecutor),
    )
    .unwrap();

    let b1 = block_with_txs(&chain.header(), 2, vec![]);
    assert!(matches!(
        chain.write_blocks(vec![b1]).unwrap_err(),
        ChainError::ExecutionMismatch("state root")
    ));
    assert_eq!(chain.header().number, 0);
}

// ==================== Concurrency ====================

#[test]
fn test_readers_run_concurrently_with_the_writer() {
    let chain = Arc::new(open_memory());

    let mut headers = Vec::new();
    let mut parent = chain.header();
    for _ in 0..50 {
        let header = child(&parent, 2);
        headers.push(header.clone());
        parent = header;
    }

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let chain = Arc::clone(&chain);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let head = chain.header();
                    // a published head always has its difficulty stored
                    assert!(chain.get_td(&head.hash).unwrap().is_some());
                    assert!(chain
                        .get_header_by_number(head.number)
                        .unwrap()
                        .is_some());
                }
            })
        })
        .collect();

    chain.write_headers(headers).unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(chain.header().number, 50);
}

// ==================== Re-open scenarios ====================

#[test]
fn test_reopen_preserves_head_and_td() {
    let data_dir = temp_data_dir();

    let h3_hash;
    {
        let chain = Blockchain::new(
            ChainConfig::on_disk(genesis(), &data_dir),
            Arc::new(MockVerifier),
            Arc::new(MockExecutor),
        )
        .unwrap();
        let h1 = child(&chain.header(), 2);
        let h2 = child(&h1, 2);
        let h3 = child(&h2, 2);
        h3_hash = h3.hash;
        chain.write_headers(vec![h1, h2, h3]).unwrap();
        chain.close();
    }

    let chain = Blockchain::new(
        ChainConfig::on_disk(genesis(), &data_dir),
        Arc::new(MockVerifier),
        Arc::new(MockExecutor),
    )
    .unwrap();

    assert_eq!(chain.header().hash, h3_hash);
    assert_eq!(chain.header().number, 3);
    assert_eq!(chain.current_td(), BigUint::from(7u64));
    assert_eq!(chain.get_header_by_number(3).unwrap().unwrap().hash, h3_hash);

    chain.close();
    cleanup(&data_dir);
}

#[test]
fn test_reopen_with_different_genesis_fails() {
    let data_dir = temp_data_dir();

    {
        let chain = Blockchain::new(
            ChainConfig::on_disk(genesis(), &data_dir),
            Arc::new(MockVerifier),
            Arc::new(MockExecutor),
        )
        .unwrap();
        chain.close();
    }

    let mut other_genesis = genesis();
    other_genesis.timestamp = 12345;

    let err = Blockchain::new(
        ChainConfig::on_disk(other_genesis, &data_dir),
        Arc::new(MockVerifier),
        Arc::new(MockExecutor),
    )
    .unwrap_err();
    assert!(matches!(err, ChainError::GenesisMismatch));

    cleanup(&data_dir);
}
