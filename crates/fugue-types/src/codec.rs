//! Deterministic RLP encodings for the persisted records.
//!
//! Every record has a fixed field order; integers encode as minimal
//! big-endian byte strings, nested lists carry a total-length prefix. The
//! header and transaction encodings double as the hash pre-images, so the
//! cached `hash` fields are excluded.

use bytes::Bytes;
use fugue_primitives::H256;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

use crate::header::{Block, Body, Bloom, Header};
use crate::receipt::{Log, Receipt, TxStatus};
use crate::transaction::Transaction;

// u64 and smaller use the rlp crate's built-in minimal-byte encoding; u128
// goes through these helpers.

fn append_u128(s: &mut RlpStream, value: u128) {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(16);
    s.encoder().encode_value(&bytes[start..]);
}

fn u128_at(rlp: &Rlp, index: usize) -> Result<u128, DecoderError> {
    let bytes: Vec<u8> = rlp.val_at(index)?;
    if bytes.len() > 16 {
        return Err(DecoderError::RlpIsTooBig);
    }
    if bytes.first() == Some(&0) {
        return Err(DecoderError::Custom("leading zero in integer"));
    }
    Ok(bytes.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128))
}

impl Encodable for Bloom {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl Decodable for Bloom {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let bytes: Vec<u8> = rlp.as_val()?;
        let raw: [u8; 256] = bytes
            .try_into()
            .map_err(|_| DecoderError::RlpInvalidLength)?;
        Ok(Bloom::from_bytes(raw))
    }
}

impl Encodable for Header {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(15);
        s.append(&self.parent_hash);
        s.append(&self.uncles_hash);
        s.append(&self.coinbase);
        s.append(&self.state_root);
        s.append(&self.tx_root);
        s.append(&self.receipts_root);
        s.append(&self.logs_bloom);
        s.append(&self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.timestamp);
        s.encoder().encode_value(&self.extra_data);
        s.append(&self.mix_hash);
        s.append(&self.nonce);
    }
}

impl Decodable for Header {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 15 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Header {
            parent_hash: rlp.val_at(0)?,
            uncles_hash: rlp.val_at(1)?,
            coinbase: rlp.val_at(2)?,
            state_root: rlp.val_at(3)?,
            tx_root: rlp.val_at(4)?,
            receipts_root: rlp.val_at(5)?,
            logs_bloom: rlp.val_at(6)?,
            difficulty: rlp.val_at(7)?,
            number: rlp.val_at(8)?,
            gas_limit: rlp.val_at(9)?,
            gas_used: rlp.val_at(10)?,
            timestamp: rlp.val_at(11)?,
            extra_data: Bytes::from(rlp.val_at::<Vec<u8>>(12)?),
            mix_hash: rlp.val_at(13)?,
            nonce: rlp.val_at(14)?,
            // the cached hash is not persisted; callers recompute it
            hash: H256::ZERO,
        })
    }
}

impl Encodable for Transaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(9);
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas);
        match &self.to {
            Some(to) => s.append(to),
            None => s.append_empty_data(),
        };
        append_u128(s, self.value);
        s.encoder().encode_value(&self.input);
        s.append(&self.v);
        s.append(&self.r);
        s.append(&self.s);
    }
}

impl Decodable for Transaction {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 9 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let to_item = rlp.at(3)?;
        let to = if to_item.is_empty() {
            None
        } else {
            Some(to_item.as_val()?)
        };
        Ok(Transaction {
            nonce: rlp.val_at(0)?,
            gas_price: rlp.val_at(1)?,
            gas: rlp.val_at(2)?,
            to,
            value: u128_at(rlp, 4)?,
            input: Bytes::from(rlp.val_at::<Vec<u8>>(5)?),
            v: rlp.val_at(6)?,
            r: rlp.val_at(7)?,
            s: rlp.val_at(8)?,
            hash: H256::ZERO,
        })
    }
}

impl Encodable for Body {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append_list(&self.transactions);
        s.append_list(&self.uncles);
    }
}

impl Decodable for Body {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 2 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Body {
            transactions: rlp.list_at(0)?,
            uncles: rlp.list_at(1)?,
        })
    }
}

impl Encodable for Log {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.address);
        s.append_list(&self.topics);
        s.encoder().encode_value(&self.data);
    }
}

impl Decodable for Log {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 3 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Log {
            address: rlp.val_at(0)?,
            topics: rlp.list_at(1)?,
            data: Bytes::from(rlp.val_at::<Vec<u8>>(2)?),
        })
    }
}

impl Encodable for Receipt {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&(self.status as u8));
        s.append(&self.cumulative_gas_used);
        s.append(&self.logs_bloom);
        s.append_list(&self.logs);
    }
}

impl Decodable for Receipt {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 4 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let status = match rlp.val_at::<u8>(0)? {
            0 => TxStatus::Failure,
            1 => TxStatus::Success,
            _ => return Err(DecoderError::Custom("invalid receipt status")),
        };
        Ok(Receipt {
            status,
            cumulative_gas_used: rlp.val_at(1)?,
            logs_bloom: rlp.val_at(2)?,
            logs: rlp.list_at(3)?,
        })
    }
}

impl Encodable for Block {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.header);
        s.append_list(&self.transactions);
        s.append_list(&self.uncles);
    }
}

impl Decodable for Block {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 3 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Block {
            header: rlp.val_at(0)?,
            transactions: rlp.list_at(1)?,
            uncles: rlp.list_at(2)?,
        })
    }
}

/// Encode a header for persistence or hashing.
pub fn encode_header(header: &Header) -> Vec<u8> {
    rlp::encode(header).to_vec()
}

/// Decode a persisted header. The cached hash comes back zeroed; callers
/// recompute it.
pub fn decode_header(bytes: &[u8]) -> Result<Header, DecoderError> {
    rlp::decode(bytes)
}

/// Encode a block body for persistence.
pub fn encode_body(body: &Body) -> Vec<u8> {
    rlp::encode(body).to_vec()
}

/// Decode a persisted block body.
pub fn decode_body(bytes: &[u8]) -> Result<Body, DecoderError> {
    rlp::decode(bytes)
}

/// Encode a block's receipts for persistence.
pub fn encode_receipts(receipts: &[Receipt]) -> Vec<u8> {
    rlp::encode_list::<Receipt, _>(receipts).to_vec()
}

/// Decode a block's persisted receipts.
pub fn decode_receipts(bytes: &[u8]) -> Result<Vec<Receipt>, DecoderError> {
    Rlp::new(bytes).as_list()
}

/// Encode a hash list (the fork-tip set).
pub fn encode_hash_list(hashes: &[H256]) -> Vec<u8> {
    rlp::encode_list::<H256, _>(hashes).to_vec()
}

/// Decode a persisted hash list.
pub fn decode_hash_list(bytes: &[u8]) -> Result<Vec<H256>, DecoderError> {
    Rlp::new(bytes).as_list()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fugue_primitives::Address;

    fn sample_header() -> Header {
        let mut header = Header {
            parent_hash: H256::from_bytes([0x01; 32]),
            uncles_hash: H256::from_bytes([0x02; 32]),
            coinbase: Address::from_bytes([0x03; 20]),
            state_root: H256::from_bytes([0x04; 32]),
            tx_root: H256::from_bytes([0x05; 32]),
            receipts_root: H256::from_bytes([0x06; 32]),
            logs_bloom: Bloom::from_bytes([0x07; 256]),
            difficulty: 1_000,
            number: 42,
            gas_limit: 30_000_000,
            gas_used: 21_000,
            timestamp: 1_700_000_000,
            extra_data: Bytes::from_static(b"fugue"),
            mix_hash: H256::from_bytes([0x08; 32]),
            nonce: 0xdeadbeef,
            hash: H256::ZERO,
        };
        header.compute_hash();
        header
    }

    fn sample_tx(to: Option<Address>) -> Transaction {
        let mut tx = Transaction {
            nonce: 7,
            gas_price: 30,
            gas: 21_000,
            to,
            value: 10_u128.pow(21),
            input: Bytes::from_static(&[0xca, 0xfe]),
            v: 27,
            r: H256::from_bytes([0x11; 32]),
            s: H256::from_bytes([0x22; 32]),
            hash: H256::ZERO,
        };
        tx.compute_hash();
        tx
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample_header();
        let mut decoded = decode_header(&encode_header(&header)).unwrap();
        assert_eq!(decoded.hash, H256::ZERO);
        decoded.compute_hash();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_encoding_deterministic() {
        let header = sample_header();
        assert_eq!(encode_header(&header), encode_header(&header.clone()));
    }

    #[test]
    fn test_header_rejects_truncated_input() {
        let encoded = encode_header(&sample_header());
        assert!(decode_header(&encoded[..encoded.len() - 1]).is_err());
    }

    #[test]
    fn test_transaction_roundtrip_call_and_create() {
        for to in [Some(Address::from_bytes([0x42; 20])), None] {
            let tx = sample_tx(to);
            let mut decoded: Transaction = rlp::decode(&rlp::encode(&tx)).unwrap();
            decoded.compute_hash();
            assert_eq!(decoded, tx);
        }
    }

    #[test]
    fn test_value_boundaries() {
        for value in [0u128, 1, 127, 128, u64::MAX as u128, u128::MAX] {
            let mut tx = sample_tx(None);
            tx.value = value;
            tx.compute_hash();
            let mut decoded: Transaction = rlp::decode(&rlp::encode(&tx)).unwrap();
            decoded.compute_hash();
            assert_eq!(decoded.value, value);
            assert_eq!(decoded, tx);
        }
    }

    #[test]
    fn test_body_roundtrip() {
        let body = Body {
            transactions: vec![sample_tx(None), sample_tx(Some(Address::ZERO))],
            uncles: vec![sample_header()],
        };
        let mut decoded = decode_body(&encode_body(&body)).unwrap();
        for tx in &mut decoded.transactions {
            tx.compute_hash();
        }
        for uncle in &mut decoded.uncles {
            uncle.compute_hash();
        }
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_empty_body_roundtrip() {
        let body = Body::default();
        assert_eq!(decode_body(&encode_body(&body)).unwrap(), body);
    }

    #[test]
    fn test_receipts_roundtrip() {
        let log = Log::new(
            Address::from_bytes([0x55; 20]),
            vec![H256::from_bytes([0x66; 32]), H256::from_bytes([0x77; 32])],
            Bytes::from_static(&[0x01, 0x02, 0x03]),
        );
        let receipts = vec![
            Receipt::new(TxStatus::Success, 21_000, vec![log]),
            Receipt::new(TxStatus::Failure, 42_000, vec![]),
        ];
        let decoded = decode_receipts(&encode_receipts(&receipts)).unwrap();
        assert_eq!(decoded, receipts);
    }

    #[test]
    fn test_receipt_rejects_unknown_status() {
        let mut s = RlpStream::new_list(4);
        s.append(&2u8);
        s.append(&0u64);
        s.append(&Bloom::default());
        s.begin_list(0);
        assert!(rlp::decode::<Receipt>(&s.out()).is_err());
    }

    #[test]
    fn test_hash_list_roundtrip() {
        let hashes = vec![H256::from_bytes([0x01; 32]), H256::from_bytes([0x02; 32])];
        assert_eq!(decode_hash_list(&encode_hash_list(&hashes)).unwrap(), hashes);
        assert_eq!(
            decode_hash_list(&encode_hash_list(&[])).unwrap(),
            Vec::<H256>::new()
        );
    }

    #[test]
    fn test_block_roundtrip() {
        let block = Block::new(sample_header(), vec![sample_tx(None)], vec![]);
        let mut decoded: Block = rlp::decode(&rlp::encode(&block)).unwrap();
        decoded.header.compute_hash();
        for tx in &mut decoded.transactions {
            tx.compute_hash();
        }
        assert_eq!(decoded, block);
    }
}
