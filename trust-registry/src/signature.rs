//! Signer verification for FeedbackAuth redemptions
//!
//! A claimed signer is either a plain keypair, checked by ECDSA recovery, or
//! a programmable signer whose own validation logic decides (ERC-1271 style).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use ethers::types::{Address, Signature, H256, U256};
use parking_lot::RwLock;

use crate::error::{RegistryError, RegistryResult};
use crate::feedback_auth::SIGNATURE_LEN;

/// `bytes4(keccak256("isValidSignature(bytes32,bytes)"))`
pub const ERC1271_MAGIC_VALUE: [u8; 4] = [0x16, 0x26, 0xba, 0x7e];

/// secp256k1n / 2; signatures with a larger `s` are malleable and rejected
const SECP256K1_HALF_ORDER: &str =
    "7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0";

/// Signer whose validity check is executable logic rather than key recovery
pub trait ProgrammableSigner: Send + Sync {
    /// Return [`ERC1271_MAGIC_VALUE`] to accept. Any other value or an `Err`
    /// means the signature is invalid.
    fn is_valid_signature(&self, hash: H256, signature: &[u8]) -> Result<[u8; 4], String>;
}

#[derive(Clone)]
pub enum SignerKind {
    Simple,
    Programmable(Arc<dyn ProgrammableSigner>),
}

impl fmt::Debug for SignerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerKind::Simple => write!(f, "Simple"),
            SignerKind::Programmable(_) => write!(f, "Programmable"),
        }
    }
}

impl SignerKind {
    /// Check that `signature` over `hash` was produced by `signer`
    pub fn verify(&self, signer: Address, hash: H256, signature: &[u8]) -> RegistryResult<()> {
        match self {
            SignerKind::Simple => {
                let recovered = recover_signer(hash, signature)?;
                if recovered != signer {
                    return Err(RegistryError::InvalidSignature(format!(
                        "recovered {:?}, expected {:?}",
                        recovered, signer
                    )));
                }
                Ok(())
            }
            SignerKind::Programmable(logic) => match logic.is_valid_signature(hash, signature) {
                Ok(magic) if magic == ERC1271_MAGIC_VALUE => Ok(()),
                Ok(magic) => Err(RegistryError::InvalidSignature(format!(
                    "signer {:?} returned 0x{}",
                    signer,
                    hex::encode(magic)
                ))),
                Err(e) => Err(RegistryError::InvalidSignature(format!(
                    "signer {:?} rejected: {}",
                    signer, e
                ))),
            },
        }
    }
}

/// Recover the address behind a 65-byte `r ++ s ++ v` signature.
///
/// Only canonical signatures are accepted: `v` must be 27 or 28 and `s` must
/// be in the lower half of the curve order.
pub fn recover_signer(hash: H256, signature: &[u8]) -> RegistryResult<Address> {
    if signature.len() != SIGNATURE_LEN {
        return Err(RegistryError::InvalidSignature(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LEN,
            signature.len()
        )));
    }
    let sig = Signature::try_from(signature)
        .map_err(|e| RegistryError::InvalidSignature(e.to_string()))?;

    if sig.v != 27 && sig.v != 28 {
        return Err(RegistryError::InvalidSignature(format!("bad v value {}", sig.v)));
    }
    let half_order = U256::from_str_radix(SECP256K1_HALF_ORDER, 16)
        .map_err(|e| RegistryError::InvalidSignature(e.to_string()))?;
    if sig.s > half_order {
        return Err(RegistryError::InvalidSignature("non-canonical s value".to_string()));
    }

    sig.recover(hash)
        .map_err(|e| RegistryError::InvalidSignature(e.to_string()))
}

/// Resolves a claimed signer address to the way it must be verified
pub trait SignerDirectory: Send + Sync {
    fn signer_kind(&self, address: Address) -> SignerKind;
}

/// In-memory directory of addresses that carry signer logic.
/// Addresses never deployed here verify as plain keypairs.
#[derive(Default)]
pub struct ContractSigners {
    signers: RwLock<HashMap<Address, Arc<dyn ProgrammableSigner>>>,
}

impl ContractSigners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach signer logic to `address`, replacing any previous logic
    pub fn deploy(&self, address: Address, signer: Arc<dyn ProgrammableSigner>) {
        log::info!("[SIGNERS] Programmable signer deployed at {:?}", address);
        self.signers.write().insert(address, signer);
    }

    pub fn remove(&self, address: Address) -> bool {
        self.signers.write().remove(&address).is_some()
    }

    pub fn is_programmable(&self, address: Address) -> bool {
        self.signers.read().contains_key(&address)
    }
}

impl SignerDirectory for ContractSigners {
    fn signer_kind(&self, address: Address) -> SignerKind {
        match self.signers.read().get(&address) {
            Some(logic) => SignerKind::Programmable(Arc::clone(logic)),
            None => SignerKind::Simple,
        }
    }
}

/// Smart-wallet style signer: accepts a plain signature from any of its owner keys
#[derive(Debug, Clone, Default)]
pub struct OwnerSetSigner {
    owners: HashSet<Address>,
}

impl OwnerSetSigner {
    pub fn new(owners: impl IntoIterator<Item = Address>) -> Self {
        Self {
            owners: owners.into_iter().collect(),
        }
    }
}

impl ProgrammableSigner for OwnerSetSigner {
    fn is_valid_signature(&self, hash: H256, signature: &[u8]) -> Result<[u8; 4], String> {
        let recovered = recover_signer(hash, signature).map_err(|e| e.to_string())?;
        if self.owners.contains(&recovered) {
            Ok(ERC1271_MAGIC_VALUE)
        } else {
            Ok([0u8; 4])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::signers::{LocalWallet, Signer};
    use ethers::utils::hash_message;

    const KEY_0: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const KEY_1: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    struct Failing;

    impl ProgrammableSigner for Failing {
        fn is_valid_signature(&self, _hash: H256, _signature: &[u8]) -> Result<[u8; 4], String> {
            Err("execution reverted".to_string())
        }
    }

    fn signed(key: &str, hash: H256) -> (Address, Vec<u8>) {
        let wallet: LocalWallet = key.parse().unwrap();
        (wallet.address(), wallet.sign_hash(hash).unwrap().to_vec())
    }

    #[test]
    fn test_simple_signer() {
        let hash = hash_message(H256::repeat_byte(7));
        let (addr, sig) = signed(KEY_0, hash);

        assert!(SignerKind::Simple.verify(addr, hash, &sig).is_ok());
        assert!(matches!(
            SignerKind::Simple.verify(Address::repeat_byte(1), hash, &sig),
            Err(RegistryError::InvalidSignature(_))
        ));
        assert!(SignerKind::Simple.verify(addr, H256::zero(), &sig).is_err());
    }

    #[test]
    fn test_rejects_bad_v_and_length() {
        let hash = H256::repeat_byte(3);
        let (_, mut sig) = signed(KEY_0, hash);
        assert!(recover_signer(hash, &sig[..64]).is_err());
        sig[64] = 1;
        assert!(recover_signer(hash, &sig).is_err());
    }

    #[test]
    fn test_rejects_high_s() {
        let hash = H256::repeat_byte(3);
        let (_, sig) = signed(KEY_0, hash);
        let mut parsed = Signature::try_from(sig.as_slice()).unwrap();
        let order = U256::from_str_radix(
            "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141",
            16,
        )
        .unwrap();
        // The malleable twin (n - s, flipped v) recovers the same key
        parsed.s = order - parsed.s;
        parsed.v = if parsed.v == 27 { 28 } else { 27 };
        assert!(recover_signer(hash, &parsed.to_vec()).is_err());
    }

    #[test]
    fn test_programmable_signer() {
        let hash = hash_message(H256::repeat_byte(9));
        let (owner_addr, owner_sig) = signed(KEY_0, hash);
        let (_, stranger_sig) = signed(KEY_1, hash);

        let wallet_addr = Address::repeat_byte(0x5a);
        let signers = ContractSigners::new();
        signers.deploy(wallet_addr, Arc::new(OwnerSetSigner::new([owner_addr])));
        signers.deploy(Address::repeat_byte(0xff), Arc::new(Failing));

        assert!(signers.is_programmable(wallet_addr));
        let kind = signers.signer_kind(wallet_addr);
        assert!(kind.verify(wallet_addr, hash, &owner_sig).is_ok());
        assert!(kind.verify(wallet_addr, hash, &stranger_sig).is_err());

        let failing = signers.signer_kind(Address::repeat_byte(0xff));
        assert!(failing.verify(Address::repeat_byte(0xff), hash, &owner_sig).is_err());

        assert!(matches!(signers.signer_kind(owner_addr), SignerKind::Simple));
        assert!(signers.remove(wallet_addr));
        assert!(matches!(signers.signer_kind(wallet_addr), SignerKind::Simple));
    }
}
