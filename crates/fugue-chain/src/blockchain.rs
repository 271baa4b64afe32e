//! The chain engine.
//!
//! Ingests headers and blocks, validates them against the injected
//! [`Verifier`] and [`Executor`], persists them through [`ChainDb`], and
//! maintains the canonical chain under the total-difficulty fork-choice
//! rule. A single writer lock serialises the mutators; readers operate on
//! immutable head snapshots published through an atomic pointer.

use crate::error::{ChainError, ChainResult};
use crate::event::{Event, EventKind, EventStream, Subscription};
use arc_swap::ArcSwap;
use fugue_primitives::H256;
use fugue_storage::{ChainDb, Database};
use fugue_types::{root, Block, Body, Header, Receipt};
use lru::LruCache;
use num_bigint::{BigInt, BigUint};
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

/// Capacity of the header and difficulty read caches.
const CACHE_SIZE: usize = 100;

/// Chain identity and storage location.
#[derive(Clone, Debug)]
pub struct ChainConfig {
    /// The genesis header; its hash fixes the chain identity and is checked
    /// against storage on every re-open.
    pub genesis: Header,
    /// Data directory for the on-disk store. `None` runs entirely in
    /// memory.
    pub data_dir: Option<PathBuf>,
}

impl ChainConfig {
    /// Configuration for an in-memory chain.
    pub fn in_memory(genesis: Header) -> Self {
        Self {
            genesis,
            data_dir: None,
        }
    }

    /// Configuration for an on-disk chain rooted at `data_dir`.
    pub fn on_disk(genesis: Header, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            genesis,
            data_dir: Some(data_dir.into()),
        }
    }
}

/// Consensus verification of a candidate header against its stored parent.
/// Implementations must be deterministic and side-effect-free; rejections
/// surface as [`ChainError::VerificationFailed`].
pub trait Verifier: Send + Sync {
    /// Verify `header` given its parent.
    fn verify_header(&self, parent: &Header, header: &Header) -> ChainResult<()>;
}

/// State execution of a full block on top of its parent's state root.
pub trait Executor: Send + Sync {
    /// Execute `block`, returning the receipts, the post-state root and the
    /// total gas consumed. The receipt count must equal the transaction
    /// count.
    fn process_block(&self, parent_root: H256, block: &Block) -> ChainResult<BlockResult>;
}

/// Result of executing one block.
#[derive(Clone, Debug, Default)]
pub struct BlockResult {
    /// One receipt per transaction, in order
    pub receipts: Vec<Receipt>,
    /// State root after the block
    pub state_root: H256,
    /// Total gas consumed by the block
    pub total_gas: u64,
}

/// Immutable head snapshot published to readers.
struct HeadState {
    header: Header,
    total_difficulty: BigUint,
}

#[derive(Default)]
struct GasPriceAvg {
    avg: BigInt,
    count: BigInt,
}

/// The chain ingestion and canonical-chain engine.
pub struct Blockchain {
    db: ChainDb,
    verifier: Arc<dyn Verifier>,
    executor: Arc<dyn Executor>,

    genesis: H256,

    headers_cache: Mutex<LruCache<H256, Header>>,
    difficulty_cache: Mutex<LruCache<H256, BigUint>>,

    // the current head header + total difficulty
    current: ArcSwap<HeadState>,

    stream: EventStream,

    // serialises write_headers / write_blocks / write_block
    write_lock: Mutex<()>,

    gas_price: Mutex<GasPriceAvg>,
}

impl Blockchain {
    /// Open (or create) a chain. An empty store is initialised with the
    /// configured genesis; a populated store must carry the same genesis
    /// hash at canonical number 0 or the open fails with
    /// [`ChainError::GenesisMismatch`].
    pub fn new(
        config: ChainConfig,
        verifier: Arc<dyn Verifier>,
        executor: Arc<dyn Executor>,
    ) -> ChainResult<Self> {
        let database = match &config.data_dir {
            Some(dir) => Database::new(dir.join("blockchain")),
            None => Database::in_memory(),
        };
        database.open().map_err(ChainError::Storage)?;
        let db = ChainDb::new(database);

        let stream = EventStream::default();
        // readiness sentinel
        stream.push(Event::default());

        let mut genesis = config.genesis.clone();
        genesis.compute_hash();

        let (head, head_td, genesis_event) = match db.read_head_hash()? {
            Some(head_hash) => {
                // initialised storage: the stored genesis is the chain
                // identity check
                let stored = db.read_canonical_hash(0)?.ok_or_else(|| {
                    ChainError::CorruptStore("canonical genesis hash missing".to_string())
                })?;
                if stored != genesis.hash {
                    return Err(ChainError::GenesisMismatch);
                }
                let header = db.read_header(&head_hash)?.ok_or_else(|| {
                    ChainError::CorruptStore(format!("head header {head_hash} missing"))
                })?;
                let td = db.read_td(&head_hash)?.ok_or_else(|| {
                    ChainError::CorruptStore(format!("head difficulty {head_hash} missing"))
                })?;
                tracing::info!(hash = %header.hash, number = header.number, "current header");
                (header, td, None)
            }
            None => {
                // empty storage: write the genesis and make it the head
                let td = BigUint::from(genesis.difficulty);
                db.write_canonical_header(&genesis, &td)?;
                tracing::info!(hash = %genesis.hash, "genesis written");

                let mut event = Event::default();
                event.add_new_header(genesis.clone());
                event.set_difficulty(td.clone());
                (genesis.clone(), td, Some(event))
            }
        };

        let chain = Self {
            db,
            verifier,
            executor,
            genesis: genesis.hash,
            headers_cache: Mutex::new(LruCache::new(NonZeroUsize::new(CACHE_SIZE).unwrap())),
            difficulty_cache: Mutex::new(LruCache::new(NonZeroUsize::new(CACHE_SIZE).unwrap())),
            current: ArcSwap::from_pointee(HeadState {
                header: head,
                total_difficulty: head_td,
            }),
            stream,
            write_lock: Mutex::new(()),
            gas_price: Mutex::new(GasPriceAvg::default()),
        };

        if let Some(event) = genesis_event {
            chain.stream.push(event);
        }
        Ok(chain)
    }

    // ---- readers ----

    /// The current head header.
    pub fn header(&self) -> Header {
        self.current.load().header.clone()
    }

    /// Total difficulty of the current head.
    pub fn current_td(&self) -> BigUint {
        self.current.load().total_difficulty.clone()
    }

    /// The genesis hash.
    pub fn genesis(&self) -> H256 {
        self.genesis
    }

    /// Header by hash.
    pub fn get_header_by_hash(&self, hash: &H256) -> ChainResult<Option<Header>> {
        self.read_header(hash)
    }

    /// Header by canonical number.
    pub fn get_header_by_number(&self, number: u64) -> ChainResult<Option<Header>> {
        match self.db.read_canonical_hash(number)? {
            Some(hash) => self.read_header(&hash),
            None => Ok(None),
        }
    }

    /// Parent of `header`.
    pub fn get_parent(&self, header: &Header) -> ChainResult<Option<Header>> {
        self.read_header(&header.parent_hash)
    }

    /// Total difficulty of the header with `hash`.
    pub fn get_td(&self, hash: &H256) -> ChainResult<Option<BigUint>> {
        self.read_difficulty(hash)
    }

    /// Body by header hash.
    pub fn get_body_by_hash(&self, hash: &H256) -> ChainResult<Option<Body>> {
        let body = self.db.read_body(hash);
        if let Err(err) = &body {
            tracing::error!(%hash, %err, "failed to read body");
        }
        body.map_err(ChainError::Storage)
    }

    /// Receipts by header hash.
    pub fn get_receipts_by_hash(&self, hash: &H256) -> ChainResult<Option<Vec<Receipt>>> {
        Ok(self.db.read_receipts(hash)?)
    }

    /// Block by hash; with `full` the body payload is attached.
    pub fn get_block_by_hash(&self, hash: &H256, full: bool) -> ChainResult<Option<Block>> {
        let Some(header) = self.read_header(hash)? else {
            return Ok(None);
        };
        let mut block = Block::new(header, vec![], vec![]);
        if !full {
            return Ok(Some(block));
        }
        if let Some(body) = self.db.read_body(hash)? {
            block.transactions = body.transactions;
            block.uncles = body.uncles;
        }
        Ok(Some(block))
    }

    /// Block by canonical number.
    pub fn get_block_by_number(&self, number: u64, full: bool) -> ChainResult<Option<Block>> {
        match self.db.read_canonical_hash(number)? {
            Some(hash) => self.get_block_by_hash(&hash, full),
            None => Ok(None),
        }
    }

    /// Containing block hash for a transaction hash.
    pub fn read_tx_lookup(&self, tx_hash: &H256) -> ChainResult<Option<H256>> {
        Ok(self.db.read_tx_lookup(tx_hash)?)
    }

    /// The fork-tip set.
    pub fn get_forks(&self) -> ChainResult<Vec<H256>> {
        Ok(self.db.read_forks()?.unwrap_or_default())
    }

    /// Hash of the ancestor of `header` at height `number`, resolved by
    /// walking parent links.
    pub fn ancestor_hash(&self, header: &Header, number: u64) -> ChainResult<Option<H256>> {
        if number >= header.number {
            return Ok(None);
        }
        let mut num = header.number - 1;
        let mut hash = header.parent_hash;
        loop {
            if num == number {
                return Ok(Some(hash));
            }
            if num == 0 {
                return Ok(None);
            }
            match self.read_header(&hash)? {
                Some(ancestor) => hash = ancestor.parent_hash,
                None => return Ok(None),
            }
            num -= 1;
        }
    }

    /// Register an event subscriber.
    pub fn subscribe(&self) -> Subscription {
        self.stream.subscribe()
    }

    /// Release the underlying store.
    pub fn close(&self) {
        self.db.close();
    }

    // ---- gas price average ----

    /// Fold one canonical block's gas usage into the rolling average.
    fn update_gas_price_avg(&self, gas_used: u64) {
        let mut gp = self.gas_price.lock();
        gp.count += BigInt::from(1);
        let differential = (BigInt::from(gas_used) - &gp.avg) / &gp.count;
        gp.avg += differential;
    }

    /// Snapshot of the rolling gas average. The update divides by the
    /// running count with truncating integer division, so early samples
    /// weigh more than late ones; consumers should treat the value as an
    /// approximation.
    pub fn avg_gas_price(&self) -> BigInt {
        self.gas_price.lock().avg.clone()
    }

    // ---- cached reads ----

    fn read_header(&self, hash: &H256) -> ChainResult<Option<Header>> {
        if let Some(header) = self.headers_cache.lock().get(hash) {
            return Ok(Some(header.clone()));
        }
        match self.db.read_header(hash)? {
            Some(header) => {
                self.headers_cache.lock().put(*hash, header.clone());
                Ok(Some(header))
            }
            None => Ok(None),
        }
    }

    fn read_difficulty(&self, hash: &H256) -> ChainResult<Option<BigUint>> {
        if let Some(td) = self.difficulty_cache.lock().get(hash) {
            return Ok(Some(td.clone()));
        }
        match self.db.read_td(hash)? {
            Some(td) => {
                self.difficulty_cache.lock().put(*hash, td.clone());
                Ok(Some(td))
            }
            None => Ok(None),
        }
    }

    fn cache_header(&self, header: &Header) {
        self.headers_cache.lock().put(header.hash, header.clone());
    }

    fn cache_difficulty(&self, hash: H256, td: BigUint) {
        self.difficulty_cache.lock().put(hash, td);
    }

    fn set_current(&self, header: Header, total_difficulty: BigUint) {
        self.current.store(Arc::new(HeadState {
            header,
            total_difficulty,
        }));
    }

    fn require_header(&self, hash: &H256) -> ChainResult<Header> {
        self.read_header(hash)?
            .ok_or_else(|| ChainError::CorruptStore(format!("ancestor header {hash} missing")))
    }

    // ---- ingestion ----

    /// Ingest an internally consecutive batch of headers. Each committed
    /// header dispatches one event; the batch stops at the first failure
    /// with all prior headers already committed.
    pub fn write_headers(&self, headers: Vec<Header>) -> ChainResult<()> {
        let _writer = self.write_lock.lock();
        self.write_headers_locked(headers)
    }

    fn write_headers_locked(&self, mut headers: Vec<Header>) -> ChainResult<()> {
        if headers.is_empty() {
            return Ok(());
        }
        for header in headers.iter_mut() {
            header.compute_hash();
        }

        // the batch must be internally consecutive
        for i in 1..headers.len() {
            if headers[i].number != headers[i - 1].number + 1 {
                return Err(ChainError::InvalidBatch {
                    index: i,
                    reason: "number sequence not consecutive",
                });
            }
            if headers[i].parent_hash != headers[i - 1].hash {
                return Err(ChainError::InvalidBatch {
                    index: i,
                    reason: "parent hash mismatch",
                });
            }
        }

        for header in headers {
            let mut event = Event::default();
            self.commit_header(&mut event, &header)?;
            self.stream.push(event);
        }
        Ok(())
    }

    /// Commit a single sealed block's header, running fork choice. The
    /// body is assumed to have been ingested through [`Self::write_blocks`]
    /// or produced locally.
    pub fn write_block(&self, mut block: Block) -> ChainResult<()> {
        let _writer = self.write_lock.lock();
        block.header.compute_hash();
        let mut event = Event::default();
        self.commit_header(&mut event, &block.header)?;
        self.stream.push(event);
        Ok(())
    }

    /// Ingest a batch of full blocks: verify the batch against the stored
    /// parent, the consensus verifier and the body roots, then execute and
    /// commit each block in order. Validation failures before the first
    /// commit leave the store untouched; a mid-batch failure leaves all
    /// prior blocks committed.
    pub fn write_blocks(&self, blocks: Vec<Block>) -> ChainResult<()> {
        let _writer = self.write_lock.lock();
        self.write_blocks_locked(blocks)
    }

    fn write_blocks_locked(&self, mut blocks: Vec<Block>) -> ChainResult<()> {
        if blocks.is_empty() {
            return Err(ChainError::InvalidBatch {
                index: 0,
                reason: "no blocks to insert",
            });
        }
        for block in blocks.iter_mut() {
            block.header.compute_hash();
            for tx in block.transactions.iter_mut() {
                tx.compute_hash();
            }
            for uncle in block.uncles.iter_mut() {
                uncle.compute_hash();
            }
        }

        if blocks.len() == 1 {
            tracing::info!(
                number = blocks[0].number(),
                parent = %blocks[0].parent_hash(),
                "write block"
            );
        } else {
            tracing::info!(
                count = blocks.len(),
                from = blocks[0].number(),
                to = blocks[blocks.len() - 1].number(),
                parent = %blocks[0].parent_hash(),
                "write blocks"
            );
        }

        let mut parent = self
            .read_header(&blocks[0].parent_hash())?
            .ok_or_else(|| ChainError::UnknownParent(blocks[0].parent_hash()))?;

        // validate the whole batch before anything is ingested
        for (index, block) in blocks.iter().enumerate() {
            let header = &block.header;
            if header.number != parent.number + 1 {
                return Err(ChainError::InvalidBatch {
                    index,
                    reason: "number sequence not consecutive",
                });
            }
            if header.parent_hash != parent.hash {
                return Err(ChainError::InvalidBatch {
                    index,
                    reason: "parent hash mismatch",
                });
            }
            self.verifier.verify_header(&parent, header)?;

            if root::uncles_root(&block.uncles) != header.uncles_hash {
                return Err(ChainError::BodyRootMismatch("uncles root"));
            }
            if root::transactions_root(&block.transactions) != header.tx_root {
                return Err(ChainError::BodyRootMismatch("transactions root"));
            }
            parent = header.clone();
        }

        for block in &blocks {
            self.write_body(block)?;

            let result = self.process_block(block)?;

            let mut event = Event::default();
            self.commit_header(&mut event, &block.header)?;
            self.stream.push(event);

            // receipts only after the header, so a reader never holds
            // receipts for a header it cannot resolve
            self.db.write_receipts(&block.hash(), &result.receipts)?;

            self.update_gas_price_avg(block.header.gas_used);
        }

        let head = self.header();
        tracing::info!(hash = %head.hash, number = head.number, "new head");
        Ok(())
    }

    /// Write the body and the per-transaction lookup entries.
    fn write_body(&self, block: &Block) -> ChainResult<()> {
        self.db.write_body(&block.hash(), &block.body())?;
        for tx in &block.transactions {
            self.db.write_tx_lookup(&tx.hash, &block.hash())?;
        }
        Ok(())
    }

    /// Execute a block and check the result against its header.
    fn process_block(&self, block: &Block) -> ChainResult<BlockResult> {
        let header = &block.header;
        let parent = self
            .read_header(&header.parent_hash)?
            .ok_or_else(|| ChainError::UnknownParent(header.parent_hash))?;

        let result = self.executor.process_block(parent.state_root, block)?;

        if result.receipts.len() != block.transactions.len() {
            return Err(ChainError::ExecutionMismatch("receipt count"));
        }
        if result.state_root != header.state_root {
            return Err(ChainError::ExecutionMismatch("state root"));
        }
        if result.total_gas != header.gas_used {
            return Err(ChainError::ExecutionMismatch("gas used"));
        }
        if root::receipts_root(&result.receipts) != header.receipts_root {
            return Err(ChainError::ExecutionMismatch("receipts root"));
        }
        Ok(result)
    }

    // ---- fork choice ----

    /// Commit one header: extend the canonical chain on the fast path,
    /// otherwise weigh the side branch against the head and either record a
    /// fork tip or reorganise.
    fn commit_header(&self, event: &mut Event, header: &Header) -> ChainResult<()> {
        let head = self.current.load_full();

        if header.parent_hash == head.header.hash {
            // fast path: canonical extension
            return self.write_canonical_header(event, header);
        }

        self.db.write_header(header)?;
        self.cache_header(header);

        let parent_td = match self.read_difficulty(&header.parent_hash)? {
            Some(td) => td,
            None if self.read_header(&header.parent_hash)?.is_some() => {
                return Err(ChainError::CorruptStore(format!(
                    "difficulty missing for stored parent {}",
                    header.parent_hash
                )));
            }
            None => return Err(ChainError::UnknownParent(header.parent_hash)),
        };

        let incoming_td = parent_td + BigUint::from(header.difficulty);
        self.db.write_td(&header.hash, &incoming_td)?;
        self.cache_difficulty(header.hash, incoming_td.clone());

        if incoming_td > head.total_difficulty {
            // heavier branch wins the head
            self.handle_reorg(event, &head.header, header, incoming_td)?;
        } else {
            // lighter (or equal) branch stays a fork; first to arrive keeps
            // the head
            event.kind = EventKind::Fork;
            event.add_old_header(header.clone());
            self.write_fork(header, head.header.hash)?;
        }
        Ok(())
    }

    /// Fast-path commit of a head extension: header, difficulty, canonical
    /// entry and head pointers in one atomic group.
    fn write_canonical_header(&self, event: &mut Event, header: &Header) -> ChainResult<()> {
        let head = self.current.load_full();
        let td = &head.total_difficulty + BigUint::from(header.difficulty);

        self.db.write_canonical_header(header, &td)?;
        self.cache_header(header);
        self.cache_difficulty(header.hash, td.clone());

        event.kind = EventKind::Head;
        event.add_new_header(header.clone());
        event.set_difficulty(td.clone());

        self.set_current(header.clone(), td);
        Ok(())
    }

    /// Replace the canonical suffix above the common ancestor of `old_head`
    /// and `new_head`.
    fn handle_reorg(
        &self,
        event: &mut Event,
        old_head: &Header,
        new_head: &Header,
        new_td: BigUint,
    ) -> ChainResult<()> {
        let mut old_cursor = old_head.clone();
        let mut new_cursor = new_head.clone();
        let mut old_chain: Vec<Header> = Vec::new();
        let mut new_chain: Vec<Header> = Vec::new();

        // walk the longer side down to equal height
        while old_cursor.number > new_cursor.number {
            old_cursor = self.require_header(&old_cursor.parent_hash)?;
            old_chain.push(old_cursor.clone());
        }
        while new_cursor.number > old_cursor.number {
            new_cursor = self.require_header(&new_cursor.parent_hash)?;
            new_chain.push(new_cursor.clone());
        }

        // walk both sides in lockstep to the common ancestor, which belongs
        // to neither list
        while old_cursor.hash != new_cursor.hash {
            old_cursor = self.require_header(&old_cursor.parent_hash)?;
            new_cursor = self.require_header(&new_cursor.parent_hash)?;
            if old_cursor.hash == new_cursor.hash {
                break;
            }
            old_chain.push(old_cursor.clone());
            new_chain.push(new_cursor.clone());
        }

        // the displaced head becomes a fork tip
        self.write_fork(old_head, new_head.hash)?;

        // rewrite the canonical index along the new branch, oldest first,
        // filling in any difficulty entry that was never stored
        for header in new_chain.iter().rev() {
            self.ensure_difficulty(header)?;
            self.db.write_canonical_hash(header.number, &header.hash)?;
        }

        // head pointers last
        self.db.write_head(new_head, &new_td)?;
        self.cache_difficulty(new_head.hash, new_td.clone());
        self.set_current(new_head.clone(), new_td.clone());

        event.kind = EventKind::Reorg;
        event.set_difficulty(new_td);
        event.add_old_header(old_head.clone());
        for header in &old_chain {
            event.add_old_header(header.clone());
        }
        for header in new_chain.iter().rev() {
            event.add_new_header(header.clone());
        }
        event.add_new_header(new_head.clone());

        tracing::info!(
            old = %old_head.hash,
            new = %new_head.hash,
            number = new_head.number,
            "chain reorganised"
        );
        Ok(())
    }

    /// Persist the total difficulty for `header` if it is not stored yet.
    fn ensure_difficulty(&self, header: &Header) -> ChainResult<()> {
        if self.read_difficulty(&header.hash)?.is_some() {
            return Ok(());
        }
        let parent_td = self.read_difficulty(&header.parent_hash)?.ok_or_else(|| {
            ChainError::CorruptStore(format!(
                "difficulty missing for stored parent {}",
                header.parent_hash
            ))
        })?;
        let td = parent_td + BigUint::from(header.difficulty);
        self.db.write_td(&header.hash, &td)?;
        self.cache_difficulty(header.hash, td);
        Ok(())
    }

    /// Update the persisted fork-tip set: the header's parent stops being a
    /// tip, the header becomes one (unless it is the head).
    fn write_fork(&self, header: &Header, head_hash: H256) -> ChainResult<()> {
        let mut forks = self.db.read_forks()?.unwrap_or_default();
        forks.retain(|fork| *fork != header.parent_hash);
        if header.hash != head_hash && !forks.contains(&header.hash) {
            forks.push(header.hash);
        }
        self.db.write_forks(&forks)?;
        Ok(())
    }
}
