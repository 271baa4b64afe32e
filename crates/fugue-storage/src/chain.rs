//! Typed facade over the raw database for the chain records.
//!
//! Keys are the record's natural identity: header hashes for headers,
//! bodies, receipts and difficulty; big-endian numbers for the canonical
//! index; fixed keys in the `meta` family for the head pointers and the
//! fork-tip set. Values are the fugue-types codec encodings.

use crate::db::{cf, Database};
use crate::error::{StorageError, StorageResult};
use fugue_primitives::H256;
use fugue_types::{codec, Body, Header, Receipt};
use num_bigint::BigUint;

const KEY_HEAD_HASH: &[u8] = b"head_hash";
const KEY_HEAD_NUMBER: &[u8] = b"head_number";
const KEY_FORKS: &[u8] = b"forks";

/// Typed chain-record store.
pub struct ChainDb {
    db: Database,
}

impl ChainDb {
    /// Wrap an opened database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Close the underlying database.
    pub fn close(&self) {
        self.db.close();
    }

    // ---- headers ----

    /// Store a header under its hash.
    pub fn write_header(&self, header: &Header) -> StorageResult<()> {
        self.db.put(
            cf::HEADERS,
            header.hash.as_bytes(),
            &codec::encode_header(header),
        )
    }

    /// Read a header by hash. The cached hash field is recomputed.
    pub fn read_header(&self, hash: &H256) -> StorageResult<Option<Header>> {
        match self.db.get(cf::HEADERS, hash.as_bytes())? {
            Some(bytes) => {
                let mut header = codec::decode_header(&bytes)
                    .map_err(|e| StorageError::Corrupt(format!("header {hash}: {e}")))?;
                header.compute_hash();
                Ok(Some(header))
            }
            None => Ok(None),
        }
    }

    // ---- bodies ----

    /// Store a block body under its header hash.
    pub fn write_body(&self, hash: &H256, body: &Body) -> StorageResult<()> {
        self.db
            .put(cf::BODIES, hash.as_bytes(), &codec::encode_body(body))
    }

    /// Read a block body by header hash.
    pub fn read_body(&self, hash: &H256) -> StorageResult<Option<Body>> {
        match self.db.get(cf::BODIES, hash.as_bytes())? {
            Some(bytes) => {
                let mut body = codec::decode_body(&bytes)
                    .map_err(|e| StorageError::Corrupt(format!("body {hash}: {e}")))?;
                for tx in &mut body.transactions {
                    tx.compute_hash();
                }
                for uncle in &mut body.uncles {
                    uncle.compute_hash();
                }
                Ok(Some(body))
            }
            None => Ok(None),
        }
    }

    // ---- receipts ----

    /// Store a block's receipts under its header hash.
    pub fn write_receipts(&self, hash: &H256, receipts: &[Receipt]) -> StorageResult<()> {
        self.db.put(
            cf::RECEIPTS,
            hash.as_bytes(),
            &codec::encode_receipts(receipts),
        )
    }

    /// Read a block's receipts by header hash.
    pub fn read_receipts(&self, hash: &H256) -> StorageResult<Option<Vec<Receipt>>> {
        match self.db.get(cf::RECEIPTS, hash.as_bytes())? {
            Some(bytes) => Ok(Some(codec::decode_receipts(&bytes).map_err(|e| {
                StorageError::Corrupt(format!("receipts {hash}: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    // ---- canonical index ----

    /// Map a block number to its canonical hash.
    pub fn write_canonical_hash(&self, number: u64, hash: &H256) -> StorageResult<()> {
        self.db
            .put(cf::CANONICAL, &number.to_be_bytes(), hash.as_bytes())
    }

    /// Read the canonical hash for a block number.
    pub fn read_canonical_hash(&self, number: u64) -> StorageResult<Option<H256>> {
        match self.db.get(cf::CANONICAL, &number.to_be_bytes())? {
            Some(bytes) => Ok(Some(H256::from_slice(&bytes).map_err(|e| {
                StorageError::Corrupt(format!("canonical {number}: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    // ---- total difficulty ----

    /// Store the total difficulty for a header hash.
    pub fn write_td(&self, hash: &H256, td: &BigUint) -> StorageResult<()> {
        self.db
            .put(cf::DIFFICULTY, hash.as_bytes(), &td.to_bytes_be())
    }

    /// Read the total difficulty for a header hash.
    pub fn read_td(&self, hash: &H256) -> StorageResult<Option<BigUint>> {
        Ok(self
            .db
            .get(cf::DIFFICULTY, hash.as_bytes())?
            .map(|bytes| BigUint::from_bytes_be(&bytes)))
    }

    // ---- head pointers ----

    /// Store the head hash.
    pub fn write_head_hash(&self, hash: &H256) -> StorageResult<()> {
        self.db.put(cf::META, KEY_HEAD_HASH, hash.as_bytes())
    }

    /// Read the head hash.
    pub fn read_head_hash(&self) -> StorageResult<Option<H256>> {
        match self.db.get(cf::META, KEY_HEAD_HASH)? {
            Some(bytes) => Ok(Some(H256::from_slice(&bytes).map_err(|e| {
                StorageError::Corrupt(format!("head hash: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    /// Store the head number.
    pub fn write_head_number(&self, number: u64) -> StorageResult<()> {
        self.db
            .put(cf::META, KEY_HEAD_NUMBER, &number.to_be_bytes())
    }

    /// Read the head number.
    pub fn read_head_number(&self) -> StorageResult<Option<u64>> {
        match self.db.get(cf::META, KEY_HEAD_NUMBER)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .try_into()
                    .map_err(|_| StorageError::Corrupt("head number".to_string()))?;
                Ok(Some(u64::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    // ---- transaction lookups ----

    /// Map a transaction hash to its containing block hash.
    pub fn write_tx_lookup(&self, tx_hash: &H256, block_hash: &H256) -> StorageResult<()> {
        self.db
            .put(cf::TX_LOOKUP, tx_hash.as_bytes(), block_hash.as_bytes())
    }

    /// Read the containing block hash for a transaction hash.
    pub fn read_tx_lookup(&self, tx_hash: &H256) -> StorageResult<Option<H256>> {
        match self.db.get(cf::TX_LOOKUP, tx_hash.as_bytes())? {
            Some(bytes) => Ok(Some(H256::from_slice(&bytes).map_err(|e| {
                StorageError::Corrupt(format!("tx lookup {tx_hash}: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    // ---- fork tips ----

    /// Store the fork-tip set.
    pub fn write_forks(&self, forks: &[H256]) -> StorageResult<()> {
        self.db
            .put(cf::META, KEY_FORKS, &codec::encode_hash_list(forks))
    }

    /// Read the fork-tip set.
    pub fn read_forks(&self) -> StorageResult<Option<Vec<H256>>> {
        match self.db.get(cf::META, KEY_FORKS)? {
            Some(bytes) => Ok(Some(codec::decode_hash_list(&bytes).map_err(|e| {
                StorageError::Corrupt(format!("forks: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    // ---- grouped commits ----

    /// Commit a new canonical header in one atomic batch: header, total
    /// difficulty, canonical index entry, then the head pointers last.
    pub fn write_canonical_header(&self, header: &Header, td: &BigUint) -> StorageResult<()> {
        let mut batch = self.db.batch();
        batch.put(
            cf::HEADERS,
            header.hash.as_bytes(),
            &codec::encode_header(header),
        );
        batch.put(cf::DIFFICULTY, header.hash.as_bytes(), &td.to_bytes_be());
        batch.put(
            cf::CANONICAL,
            &header.number.to_be_bytes(),
            header.hash.as_bytes(),
        );
        batch.put(cf::META, KEY_HEAD_NUMBER, &header.number.to_be_bytes());
        batch.put(cf::META, KEY_HEAD_HASH, header.hash.as_bytes());
        self.db.write_batch(batch)
    }

    /// Advance the head to an already-stored header in one atomic batch:
    /// total difficulty and canonical entry first, head pointers last.
    pub fn write_head(&self, header: &Header, td: &BigUint) -> StorageResult<()> {
        let mut batch = self.db.batch();
        batch.put(cf::DIFFICULTY, header.hash.as_bytes(), &td.to_bytes_be());
        batch.put(
            cf::CANONICAL,
            &header.number.to_be_bytes(),
            header.hash.as_bytes(),
        );
        batch.put(cf::META, KEY_HEAD_NUMBER, &header.number.to_be_bytes());
        batch.put(cf::META, KEY_HEAD_HASH, header.hash.as_bytes());
        self.db.write_batch(batch)
    }
}
