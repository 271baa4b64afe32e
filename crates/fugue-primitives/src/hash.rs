//! 256-bit hash type

use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use std::fmt;
use thiserror::Error;

/// Errors produced when parsing fixed-width byte values.
#[derive(Debug, Error)]
pub enum HashError {
    /// Input was not valid hex
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    /// Input had the wrong byte length
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Expected byte length
        expected: usize,
        /// Actual byte length
        got: usize,
    },
}

/// 256-bit hash (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct H256([u8; 32]);

/// Alias used by the chain crates.
pub type Hash = H256;

impl H256 {
    /// Size in bytes
    pub const LEN: usize = 32;

    /// The all-zero hash
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Create from a fixed byte array
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }

    /// Create from a byte slice, checking the length
    pub fn from_slice(slice: &[u8]) -> Result<Self, HashError> {
        if slice.len() != Self::LEN {
            return Err(HashError::InvalidLength {
                expected: Self::LEN,
                got: slice.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(H256(bytes))
    }

    /// Parse from a hex string, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| HashError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True for the all-zero hash
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Format as a `0x`-prefixed hex string
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({})", self.to_hex())
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }
}

impl AsRef<[u8]> for H256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Encodable for H256 {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl Decodable for H256 {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let bytes: Vec<u8> = rlp.as_val()?;
        H256::from_slice(&bytes).map_err(|_| DecoderError::RlpInvalidLength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        assert!(H256::ZERO.is_zero());
        assert_eq!(H256::default(), H256::ZERO);
    }

    #[test]
    fn test_from_hex_roundtrip() {
        let s = "0xabcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789";
        let hash = H256::from_hex(s).unwrap();
        assert_eq!(hash.to_hex(), s);
        // no prefix parses the same
        assert_eq!(H256::from_hex(&s[2..]).unwrap(), hash);
    }

    #[test]
    fn test_from_hex_invalid() {
        assert!(matches!(
            H256::from_hex("0xzz"),
            Err(HashError::InvalidHex(_))
        ));
        assert!(matches!(
            H256::from_hex("0x00"),
            Err(HashError::InvalidLength {
                expected: 32,
                got: 1
            })
        ));
    }

    #[test]
    fn test_from_slice_length_check() {
        assert!(H256::from_slice(&[0u8; 31]).is_err());
        assert!(H256::from_slice(&[0u8; 33]).is_err());
        let hash = H256::from_slice(&[0xab; 32]).unwrap();
        assert_eq!(hash.as_bytes(), &[0xab; 32]);
    }

    #[test]
    fn test_display_and_debug() {
        let hash = H256::from_bytes([0x11; 32]);
        assert!(format!("{}", hash).starts_with("0x1111"));
        assert!(format!("{:?}", hash).starts_with("H256(0x"));
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let lo = H256::from_bytes([0x00; 32]);
        let hi = H256::from_bytes([0xff; 32]);
        assert!(lo < hi);
    }

    #[test]
    fn test_rlp_roundtrip() {
        let hash = H256::from_bytes([0x42; 32]);
        let encoded = rlp::encode(&hash);
        assert_eq!(encoded.len(), 33); // 0xa0 prefix + 32 bytes
        let decoded: H256 = rlp::decode(&encoded).unwrap();
        assert_eq!(decoded, hash);
    }

    #[test]
    fn test_rlp_rejects_short_payload() {
        let encoded = rlp::encode(&vec![0x42u8; 16]);
        assert!(rlp::decode::<H256>(&encoded).is_err());
    }
}
