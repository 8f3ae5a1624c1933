//! Fixed-width ABI word encoding
//!
//! Only static types are needed here: every value occupies one 32-byte word.
//! Decoding is strict, so dirty padding bits are rejected instead of silently
//! truncated.

use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256 as ethers_keccak256;

pub const WORD: usize = 32;

/// Encode a uint256 value as 32 bytes (big-endian)
pub fn encode_uint256(value: U256) -> [u8; WORD] {
    let mut encoded = [0u8; WORD];
    value.to_big_endian(&mut encoded);
    encoded
}

/// Encode a uint64 value as 32 bytes (left-padded)
pub fn encode_uint64(value: u64) -> [u8; WORD] {
    let mut encoded = [0u8; WORD];
    encoded[24..].copy_from_slice(&value.to_be_bytes());
    encoded
}

/// Encode an address (20 bytes) as 32 bytes (left-padded)
pub fn encode_address(address: &Address) -> [u8; WORD] {
    let mut encoded = [0u8; WORD];
    encoded[12..].copy_from_slice(address.as_bytes());
    encoded
}

/// Decode a uint256 from exactly one word
pub fn decode_uint256(word: &[u8]) -> Result<U256, String> {
    if word.len() != WORD {
        return Err(format!("expected {} bytes, got {}", WORD, word.len()));
    }
    Ok(U256::from_big_endian(word))
}

/// Decode a uint64 from one word; upper 24 bytes must be zero
pub fn decode_uint64(word: &[u8]) -> Result<u64, String> {
    if word.len() != WORD {
        return Err(format!("expected {} bytes, got {}", WORD, word.len()));
    }
    if word[..24].iter().any(|b| *b != 0) {
        return Err("uint64 word has non-zero high bytes".to_string());
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(bytes))
}

/// Decode an address from one word; upper 12 bytes must be zero
pub fn decode_address(word: &[u8]) -> Result<Address, String> {
    if word.len() != WORD {
        return Err(format!("expected {} bytes, got {}", WORD, word.len()));
    }
    if word[..12].iter().any(|b| *b != 0) {
        return Err("address word has non-zero high bytes".to_string());
    }
    Ok(Address::from_slice(&word[12..]))
}

/// Compute keccak256 hash
pub fn keccak256(data: &[u8]) -> H256 {
    H256::from(ethers_keccak256(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_encode_uint() {
        let encoded = encode_uint64(42);
        assert_eq!(encoded[31], 42);
        assert_eq!(encoded, encode_uint256(U256::from(42)));
        assert_eq!(decode_uint64(&encoded).unwrap(), 42);
        assert_eq!(decode_uint256(&encoded).unwrap(), U256::from(42));
    }

    #[test]
    fn test_encode_address() {
        let addr = Address::from_str("0x1234567890AbCdEf1234567890aBcDeF12345678").unwrap();
        let encoded = encode_address(&addr);
        assert!(encoded[..12].iter().all(|b| *b == 0));
        assert_eq!(decode_address(&encoded).unwrap(), addr);
    }

    #[test]
    fn test_strict_padding() {
        let mut word = encode_address(&Address::repeat_byte(1));
        word[0] = 1;
        assert!(decode_address(&word).is_err());

        let mut word = encode_uint64(7);
        word[3] = 0xff;
        assert!(decode_uint64(&word).is_err());
        assert!(decode_uint256(&word[..31]).is_err());
    }

    #[test]
    fn test_keccak_empty() {
        // keccak256("") is a well-known constant
        assert_eq!(
            format!("{:?}", keccak256(b"")),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }
}
