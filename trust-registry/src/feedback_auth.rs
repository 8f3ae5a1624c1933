//! FeedbackAuth: the off-registry-signed, on-registry-redeemed capability
//!
//! # Blob layout
//!
//! ```text
//! offset   0: agentId          uint256
//! offset  32: clientAddress    address
//! offset  64: indexLimit       uint64
//! offset  96: expiry           uint256
//! offset 128: networkId        uint256
//! offset 160: registryAddress  address
//! offset 192: signerAddress    address
//! offset 224: signature        65 bytes (r ++ s ++ v)
//! ```
//!
//! The signed digest is `hash_message(keccak256(struct))`, the EIP-191
//! personal-message wrapping of the 32-byte struct hash.

use ethers::signers::LocalWallet;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::hash_message;
use serde::{Deserialize, Serialize};

use crate::abi::{
    decode_address, decode_uint256, decode_uint64, encode_address, encode_uint256, encode_uint64,
    keccak256, WORD,
};
use crate::error::{RegistryError, RegistryResult};

/// Width of the ABI-encoded struct portion
pub const AUTH_STRUCT_LEN: usize = 7 * WORD;
/// r (32) + s (32) + v (1)
pub const SIGNATURE_LEN: usize = 65;
/// The only accepted length of an authorization blob
pub const AUTH_BLOB_LEN: usize = AUTH_STRUCT_LEN + SIGNATURE_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackAuth {
    pub agent_id: U256,
    /// The only address allowed to redeem this authorization
    pub client_address: Address,
    /// Maximum number of redemptions
    pub index_limit: u64,
    /// Absolute expiry (unix seconds); must be strictly after ledger time
    pub expiry: U256,
    pub network_id: U256,
    /// Reputation registry deployment this authorization is bound to
    pub registry_address: Address,
    /// Claimed signer; must be owner, delegate or operator at redemption
    pub signer_address: Address,
}

impl FeedbackAuth {
    /// Build an authorization that expires `expiry_hours` after `now`
    #[allow(clippy::too_many_arguments)]
    pub fn with_expiry_hours(
        agent_id: u64,
        client_address: Address,
        index_limit: u64,
        expiry_hours: u64,
        network_id: U256,
        registry_address: Address,
        signer_address: Address,
        now: u64,
    ) -> Self {
        Self {
            agent_id: U256::from(agent_id),
            client_address,
            index_limit,
            expiry: U256::from(now) + U256::from(expiry_hours) * U256::from(3600u64),
            network_id,
            registry_address,
            signer_address,
        }
    }

    /// ABI-encode the seven fields (224 bytes)
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(AUTH_STRUCT_LEN);
        data.extend_from_slice(&encode_uint256(self.agent_id));
        data.extend_from_slice(&encode_address(&self.client_address));
        data.extend_from_slice(&encode_uint64(self.index_limit));
        data.extend_from_slice(&encode_uint256(self.expiry));
        data.extend_from_slice(&encode_uint256(self.network_id));
        data.extend_from_slice(&encode_address(&self.registry_address));
        data.extend_from_slice(&encode_address(&self.signer_address));
        data
    }

    /// Decode the struct portion; `data` must be exactly [`AUTH_STRUCT_LEN`] bytes
    pub fn decode(data: &[u8]) -> RegistryResult<Self> {
        if data.len() != AUTH_STRUCT_LEN {
            return Err(RegistryError::MalformedAuthorization(format!(
                "struct must be {} bytes, got {}",
                AUTH_STRUCT_LEN,
                data.len()
            )));
        }
        let word = |i: usize| &data[i * WORD..(i + 1) * WORD];
        let malformed = |field: &str, e: String| {
            RegistryError::MalformedAuthorization(format!("{}: {}", field, e))
        };

        Ok(Self {
            agent_id: decode_uint256(word(0)).map_err(|e| malformed("agentId", e))?,
            client_address: decode_address(word(1)).map_err(|e| malformed("clientAddress", e))?,
            index_limit: decode_uint64(word(2)).map_err(|e| malformed("indexLimit", e))?,
            expiry: decode_uint256(word(3)).map_err(|e| malformed("expiry", e))?,
            network_id: decode_uint256(word(4)).map_err(|e| malformed("networkId", e))?,
            registry_address: decode_address(word(5))
                .map_err(|e| malformed("registryAddress", e))?,
            signer_address: decode_address(word(6)).map_err(|e| malformed("signerAddress", e))?,
        })
    }

    /// keccak256 of the encoded struct
    pub fn struct_hash(&self) -> H256 {
        keccak256(&self.encode())
    }

    /// The digest the signer actually signs (EIP-191 wrapped struct hash)
    pub fn signing_hash(&self) -> H256 {
        hash_message(self.struct_hash())
    }

    pub fn usage_key(&self) -> H256 {
        usage_key(self.agent_id, self.client_address, self.index_limit, self.expiry)
    }
}

/// Deterministic key under which redemptions of one authorization are counted
pub fn usage_key(agent_id: U256, client_address: Address, index_limit: u64, expiry: U256) -> H256 {
    let mut data = Vec::with_capacity(4 * WORD);
    data.extend_from_slice(&encode_uint256(agent_id));
    data.extend_from_slice(&encode_address(&client_address));
    data.extend_from_slice(&encode_uint64(index_limit));
    data.extend_from_slice(&encode_uint256(expiry));
    keccak256(&data)
}

/// Split a blob into its authorization and signature.
/// The length is checked before anything is parsed.
pub fn parse_blob(blob: &[u8]) -> RegistryResult<(FeedbackAuth, &[u8])> {
    if blob.len() != AUTH_BLOB_LEN {
        return Err(RegistryError::InvalidAuthLength {
            expected: AUTH_BLOB_LEN,
            actual: blob.len(),
        });
    }
    let (fields, signature) = blob.split_at(AUTH_STRUCT_LEN);
    Ok((FeedbackAuth::decode(fields)?, signature))
}

/// Off-registry helper that produces authorization blobs.
///
/// Runs with the agent owner's (or delegate's) key on their side; the
/// registry never calls it.
pub struct FeedbackAuthSigner;

impl FeedbackAuthSigner {
    /// Sign `auth` with `wallet` and return `encode(auth) ++ signature`
    pub fn sign(wallet: &LocalWallet, auth: &FeedbackAuth) -> RegistryResult<Bytes> {
        let signature = wallet
            .sign_hash(auth.signing_hash())
            .map_err(|e| RegistryError::InvalidSignature(format!("Signing failed: {}", e)))?;

        let mut blob = auth.encode();
        blob.extend_from_slice(&signature.to_vec());
        log::debug!(
            "[FEEDBACK_AUTH] Signed authorization for agent {} client {:?} limit {}",
            auth.agent_id,
            auth.client_address,
            auth.index_limit
        );
        Ok(Bytes::from(blob))
    }

    /// Attach an externally produced signature (e.g. from a hardware or contract wallet)
    pub fn assemble(auth: &FeedbackAuth, signature: &[u8]) -> Bytes {
        let mut blob = auth.encode();
        blob.extend_from_slice(signature);
        Bytes::from(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::signers::Signer;

    // Hardhat account #0 (DO NOT USE IN PRODUCTION)
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn sample() -> FeedbackAuth {
        FeedbackAuth {
            agent_id: U256::from(7),
            client_address: Address::repeat_byte(0xc1),
            index_limit: 3,
            expiry: U256::from(1_800_000_000u64),
            network_id: U256::from(31337),
            registry_address: Address::repeat_byte(0xee),
            signer_address: Address::repeat_byte(0x50),
        }
    }

    #[test]
    fn test_layout_lengths() {
        assert_eq!(AUTH_STRUCT_LEN, 224);
        assert_eq!(AUTH_BLOB_LEN, 289);
        assert_eq!(sample().encode().len(), AUTH_STRUCT_LEN);
    }

    #[test]
    fn test_decode_encoded() {
        let auth = sample();
        let encoded = auth.encode();
        assert_eq!(encoded[64 + 31], 3);
        assert_eq!(FeedbackAuth::decode(&encoded).unwrap(), auth);
    }

    #[test]
    fn test_parse_blob_rejects_wrong_length() {
        for len in [0, 224, 288, 290] {
            let err = parse_blob(&vec![0u8; len]).unwrap_err();
            assert_eq!(
                err,
                RegistryError::InvalidAuthLength {
                    expected: 289,
                    actual: len
                }
            );
        }
    }

    #[test]
    fn test_dirty_client_word_is_malformed() {
        let mut blob = sample().encode();
        blob[32] = 1;
        blob.extend_from_slice(&[0u8; SIGNATURE_LEN]);
        assert!(matches!(
            parse_blob(&blob),
            Err(RegistryError::MalformedAuthorization(_))
        ));
    }

    #[test]
    fn test_usage_key_ignores_network_and_signer() {
        let a = sample();
        let mut b = sample();
        b.network_id = U256::from(1);
        b.signer_address = Address::repeat_byte(0x99);
        assert_eq!(a.usage_key(), b.usage_key());

        let mut c = sample();
        c.index_limit = 4;
        assert_ne!(a.usage_key(), c.usage_key());
    }

    #[test]
    fn test_with_expiry_hours() {
        let auth = FeedbackAuth::with_expiry_hours(
            1,
            Address::zero(),
            5,
            2,
            U256::from(1),
            Address::zero(),
            Address::zero(),
            1_000,
        );
        assert_eq!(auth.expiry, U256::from(1_000 + 7_200));
        assert_eq!(auth.agent_id, U256::one());
    }

    #[test]
    fn test_sign_recovers_signer() {
        let wallet: LocalWallet = TEST_KEY.parse().unwrap();
        let mut auth = sample();
        auth.signer_address = wallet.address();

        let blob = FeedbackAuthSigner::sign(&wallet, &auth).unwrap();
        assert_eq!(blob.len(), AUTH_BLOB_LEN);

        let (parsed, signature) = parse_blob(&blob).unwrap();
        assert_eq!(parsed, auth);
        let sig = ethers::types::Signature::try_from(signature).unwrap();
        assert_eq!(sig.recover(parsed.signing_hash()).unwrap(), wallet.address());
    }
}
