//! Reputation Registry: authorized, append-only feedback per agent
//!
//! # Redemption checks (`give_feedback`)
//!
//! 1. score is 0..=100
//! 2. blob is exactly 289 bytes
//! 3. agentId, client, expiry, network and registry match, in that order
//! 4. usage count is below `indexLimit`
//! 5. signature verifies against the claimed signer
//! 6. the signer is owner, delegate or operator of the agent
//! 7. entry, usage increment and event are committed together
//!
//! Usage is counted in step 4 but only written in step 7, so a rejected
//! redemption never consumes any of the authorization's limit.

use std::sync::Arc;

use ethers::types::{Address, H256, U256};
use parking_lot::Mutex;

use crate::context::CallContext;
use crate::error::{RegistryError, RegistryResult};
use crate::events::{EventRecord, RegistryEvent};
use crate::feedback_auth::{parse_blob, usage_key};
use crate::identity::IdentityLookup;
use crate::signature::SignerDirectory;
use crate::store::{ReputationStore, ReputationWrite, WriteBatch};
use crate::types::FeedbackEntry;

pub const MAX_SCORE: u8 = 100;

/// Arguments of a feedback submission, minus the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackSubmission {
    pub agent_id: u64,
    pub score: u8,
    pub tag1: H256,
    pub tag2: H256,
    pub content_uri: String,
    pub content_hash: H256,
    /// `encode(FeedbackAuth) ++ signature`
    pub auth: Vec<u8>,
}

pub struct ReputationRegistry {
    address: Address,
    identity: Arc<dyn IdentityLookup>,
    signers: Arc<dyn SignerDirectory>,
    store: Mutex<Box<dyn ReputationStore>>,
}

impl ReputationRegistry {
    pub fn new(
        address: Address,
        identity: Arc<dyn IdentityLookup>,
        signers: Arc<dyn SignerDirectory>,
        store: Box<dyn ReputationStore>,
    ) -> Self {
        Self {
            address,
            identity,
            signers,
            store: Mutex::new(store),
        }
    }

    /// Deployment address; authorizations must name it as `registryAddress`
    pub fn address(&self) -> Address {
        self.address
    }

    /// Redeem a FeedbackAuth and append a new entry. Returns the entry's index.
    pub fn give_feedback(&self, ctx: &CallContext, submission: FeedbackSubmission) -> RegistryResult<u64> {
        let FeedbackSubmission {
            agent_id,
            score,
            tag1,
            tag2,
            content_uri,
            content_hash,
            auth,
        } = submission;

        if score > MAX_SCORE {
            return Err(RegistryError::InvalidScore(score));
        }
        let (auth, signature) = parse_blob(&auth)?;

        if auth.agent_id != U256::from(agent_id) {
            return Err(RegistryError::AgentIdMismatch);
        }
        if auth.client_address != ctx.caller {
            return Err(RegistryError::ClientMismatch);
        }
        if auth.expiry <= U256::from(ctx.timestamp) {
            return Err(RegistryError::AuthExpired {
                expiry: auth.expiry.to_string(),
                now: ctx.timestamp,
            });
        }
        if auth.network_id != ctx.network_id {
            return Err(RegistryError::NetworkMismatch);
        }
        if auth.registry_address != self.address {
            return Err(RegistryError::RegistryMismatch);
        }

        let mut store = self.store.lock();

        let key = auth.usage_key();
        let used = store.auth_usage(key)?;
        if used >= auth.index_limit {
            return Err(RegistryError::UsageLimitExhausted {
                used,
                limit: auth.index_limit,
            });
        }

        self.signers.signer_kind(auth.signer_address).verify(
            auth.signer_address,
            auth.signing_hash(),
            signature,
        )?;

        if !self.identity.is_authorized(auth.signer_address, agent_id)? {
            return Err(RegistryError::SignerNotAuthorized {
                signer: auth.signer_address,
                agent_id,
            });
        }

        let index = store.feedback_count(agent_id)? + 1;
        let entry = FeedbackEntry {
            agent_id,
            index,
            client: ctx.caller,
            score,
            tag1,
            tag2,
            content_uri,
            content_hash,
            timestamp: ctx.timestamp,
        };
        let event = RegistryEvent::NewFeedback {
            agent_id,
            index,
            client: entry.client,
            score,
            tag1,
            tag2,
            content_uri: entry.content_uri.clone(),
            content_hash,
            timestamp: entry.timestamp,
        };

        let mut batch = WriteBatch::new();
        batch
            .write(ReputationWrite::SetAuthUsage { key, count: used + 1 })
            .write(ReputationWrite::AppendFeedback(entry))
            .emit(event);
        store.commit(batch)?;

        log::info!(
            "[REPUTATION] Feedback #{} for agent {} from {:?} (score {}, auth use {}/{})",
            index,
            agent_id,
            ctx.caller,
            score,
            used + 1,
            auth.index_limit
        );
        Ok(index)
    }

    // ============================================
    // Reads
    // ============================================

    /// Entry at 1-based `index`
    pub fn get_feedback(&self, agent_id: u64, index: u64) -> RegistryResult<FeedbackEntry> {
        self.store
            .lock()
            .feedback(agent_id, index)?
            .ok_or(RegistryError::FeedbackNotFound { agent_id, index })
    }

    /// Entries `start..=end`; requires `1 <= start <= end <= count`
    pub fn get_feedback_batch(&self, agent_id: u64, start: u64, end: u64) -> RegistryResult<Vec<FeedbackEntry>> {
        let store = self.store.lock();
        let count = store.feedback_count(agent_id)?;
        if start == 0 || start > end || end > count {
            return Err(RegistryError::InvalidRange { start, end, count });
        }
        store.feedback_range(agent_id, start, end)
    }

    pub fn feedback_count(&self, agent_id: u64) -> RegistryResult<u64> {
        self.store.lock().feedback_count(agent_id)
    }

    /// `(sum * 100 / count, count)`, i.e. the mean with two implied decimals.
    /// `(0, 0)` when the agent has no feedback.
    pub fn get_average_score(&self, agent_id: u64) -> RegistryResult<(u64, u64)> {
        let entries = self.all_feedback(agent_id)?;
        let count = entries.len() as u64;
        if count == 0 {
            return Ok((0, 0));
        }
        let sum: u64 = entries.iter().map(|e| e.score as u64).sum();
        Ok((sum * 100 / count, count))
    }

    /// Entries where either tag equals `tag`
    pub fn get_feedback_count_by_tag(&self, agent_id: u64, tag: H256) -> RegistryResult<u64> {
        Ok(self
            .all_feedback(agent_id)?
            .iter()
            .filter(|e| e.has_tag(tag))
            .count() as u64)
    }

    pub fn get_feedback_by_client(&self, agent_id: u64, client: Address) -> RegistryResult<Vec<FeedbackEntry>> {
        Ok(self
            .all_feedback(agent_id)?
            .into_iter()
            .filter(|e| e.client == client)
            .collect())
    }

    /// How many times the authorization identified by these fields was redeemed
    pub fn get_auth_usage(
        &self,
        agent_id: U256,
        client: Address,
        index_limit: u64,
        expiry: U256,
    ) -> RegistryResult<u64> {
        self.store
            .lock()
            .auth_usage(usage_key(agent_id, client, index_limit, expiry))
    }

    pub fn events_since(&self, after: u64) -> RegistryResult<Vec<EventRecord>> {
        self.store.lock().events_since(after)
    }

    fn all_feedback(&self, agent_id: u64) -> RegistryResult<Vec<FeedbackEntry>> {
        let store = self.store.lock();
        let count = store.feedback_count(agent_id)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        store.feedback_range(agent_id, 1, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback_auth::{FeedbackAuth, FeedbackAuthSigner};
    use crate::identity::IdentityRegistry;
    use crate::signature::ContractSigners;
    use crate::store::MemoryStore;
    use crate::types::tag;
    use ethers::signers::{LocalWallet, Signer};

    const OWNER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const CLIENT: Address = Address::repeat_byte(0xc1);
    const NOW: u64 = 1_700_000_000;
    const REGISTRY: Address = Address::repeat_byte(0xee);

    struct Harness {
        identity: Arc<IdentityRegistry>,
        reputation: ReputationRegistry,
        owner: LocalWallet,
        agent_id: u64,
    }

    fn ctx(caller: Address) -> CallContext {
        CallContext::new(caller, NOW, U256::from(31337))
    }

    fn harness() -> Harness {
        let owner: LocalWallet = OWNER_KEY.parse().unwrap();
        let identity = Arc::new(IdentityRegistry::new(
            Address::repeat_byte(0x1d),
            Box::new(MemoryStore::new()),
        ));
        let agent_id = identity.register(&ctx(owner.address())).unwrap();
        let reputation = ReputationRegistry::new(
            REGISTRY,
            identity.clone(),
            Arc::new(ContractSigners::new()),
            Box::new(MemoryStore::new()),
        );
        Harness {
            identity,
            reputation,
            owner,
            agent_id,
        }
    }

    fn auth_for(h: &Harness, limit: u64) -> FeedbackAuth {
        FeedbackAuth::with_expiry_hours(
            h.agent_id,
            CLIENT,
            limit,
            1,
            U256::from(31337),
            REGISTRY,
            h.owner.address(),
            NOW,
        )
    }

    fn submission(agent_id: u64, score: u8, auth: Vec<u8>) -> FeedbackSubmission {
        FeedbackSubmission {
            agent_id,
            score,
            tag1: tag("quality"),
            tag2: H256::zero(),
            content_uri: "ipfs://feedback".to_string(),
            content_hash: H256::repeat_byte(0xab),
            auth,
        }
    }

    #[test]
    fn test_give_feedback_appends() {
        let h = harness();
        let blob = FeedbackAuthSigner::sign(&h.owner, &auth_for(&h, 2)).unwrap().to_vec();

        let index = h
            .reputation
            .give_feedback(&ctx(CLIENT), submission(h.agent_id, 88, blob))
            .unwrap();
        assert_eq!(index, 1);
        let entry = h.reputation.get_feedback(h.agent_id, 1).unwrap();
        assert_eq!(entry.score, 88);
        assert_eq!(entry.client, CLIENT);
        assert_eq!(entry.timestamp, NOW);
        assert_eq!(h.reputation.feedback_count(h.agent_id).unwrap(), 1);

        let events = h.reputation.events_since(0).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.name(), "NewFeedback");
    }

    #[test]
    fn test_rejections_in_order() {
        let h = harness();
        let auth = auth_for(&h, 1);
        let blob = FeedbackAuthSigner::sign(&h.owner, &auth).unwrap().to_vec();

        // Score is checked before the blob
        assert_eq!(
            h.reputation.give_feedback(&ctx(CLIENT), submission(h.agent_id, 101, vec![])),
            Err(RegistryError::InvalidScore(101))
        );
        assert!(matches!(
            h.reputation.give_feedback(&ctx(CLIENT), submission(h.agent_id, 50, vec![0; 288])),
            Err(RegistryError::InvalidAuthLength { actual: 288, .. })
        ));
        assert_eq!(
            h.reputation.give_feedback(&ctx(CLIENT), submission(h.agent_id + 1, 50, blob.clone())),
            Err(RegistryError::AgentIdMismatch)
        );
        assert_eq!(
            h.reputation.give_feedback(&ctx(Address::repeat_byte(9)), submission(h.agent_id, 50, blob.clone())),
            Err(RegistryError::ClientMismatch)
        );

        let mut other_network = ctx(CLIENT);
        other_network.network_id = U256::from(1);
        assert_eq!(
            h.reputation.give_feedback(&other_network, submission(h.agent_id, 50, blob.clone())),
            Err(RegistryError::NetworkMismatch)
        );

        let mut wrong_registry = auth.clone();
        wrong_registry.registry_address = Address::repeat_byte(0x01);
        let wrong_blob = FeedbackAuthSigner::sign(&h.owner, &wrong_registry).unwrap().to_vec();
        assert_eq!(
            h.reputation.give_feedback(&ctx(CLIENT), submission(h.agent_id, 50, wrong_blob)),
            Err(RegistryError::RegistryMismatch)
        );
        assert_eq!(h.reputation.feedback_count(h.agent_id).unwrap(), 0);
    }

    #[test]
    fn test_bad_signature_does_not_consume_usage() {
        let h = harness();
        let auth = auth_for(&h, 1);
        let mut blob = FeedbackAuthSigner::sign(&h.owner, &auth).unwrap().to_vec();
        // Flip a bit inside r
        blob[230] ^= 0x01;

        assert!(matches!(
            h.reputation.give_feedback(&ctx(CLIENT), submission(h.agent_id, 50, blob)),
            Err(RegistryError::InvalidSignature(_))
        ));
        assert_eq!(
            h.reputation
                .get_auth_usage(auth.agent_id, CLIENT, 1, auth.expiry)
                .unwrap(),
            0
        );

        let good = FeedbackAuthSigner::sign(&h.owner, &auth).unwrap().to_vec();
        assert!(h.reputation.give_feedback(&ctx(CLIENT), submission(h.agent_id, 50, good)).is_ok());
    }

    #[test]
    fn test_signer_must_be_authorized() {
        let h = harness();
        let stranger: LocalWallet = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
            .parse()
            .unwrap();
        let mut auth = auth_for(&h, 1);
        auth.signer_address = stranger.address();
        let blob = FeedbackAuthSigner::sign(&stranger, &auth).unwrap().to_vec();

        assert_eq!(
            h.reputation.give_feedback(&ctx(CLIENT), submission(h.agent_id, 50, blob.clone())),
            Err(RegistryError::SignerNotAuthorized {
                signer: stranger.address(),
                agent_id: h.agent_id
            })
        );

        h.identity
            .set_approval_for_all(&ctx(h.owner.address()), stranger.address(), true)
            .unwrap();
        assert!(h.reputation.give_feedback(&ctx(CLIENT), submission(h.agent_id, 50, blob)).is_ok());
    }

    #[test]
    fn test_reads() {
        let h = harness();
        let blob = FeedbackAuthSigner::sign(&h.owner, &auth_for(&h, 3)).unwrap().to_vec();
        assert_eq!(h.reputation.get_average_score(h.agent_id).unwrap(), (0, 0));

        for score in [80, 90, 100] {
            h.reputation
                .give_feedback(&ctx(CLIENT), submission(h.agent_id, score, blob.clone()))
                .unwrap();
        }

        assert_eq!(h.reputation.get_average_score(h.agent_id).unwrap(), (9000, 3));
        assert_eq!(h.reputation.get_feedback_count_by_tag(h.agent_id, tag("quality")).unwrap(), 3);
        assert_eq!(h.reputation.get_feedback_count_by_tag(h.agent_id, tag("speed")).unwrap(), 0);
        assert_eq!(h.reputation.get_feedback_by_client(h.agent_id, CLIENT).unwrap().len(), 3);
        assert!(h.reputation.get_feedback_by_client(h.agent_id, REGISTRY).unwrap().is_empty());

        let batch = h.reputation.get_feedback_batch(h.agent_id, 2, 3).unwrap();
        assert_eq!(batch.iter().map(|e| e.score).collect::<Vec<_>>(), vec![90, 100]);
        assert!(h.reputation.get_feedback_batch(h.agent_id, 0, 1).is_err());
        assert!(h.reputation.get_feedback_batch(h.agent_id, 3, 2).is_err());
        assert!(h.reputation.get_feedback_batch(h.agent_id, 1, 4).is_err());
        assert_eq!(
            h.reputation.get_feedback(h.agent_id, 4),
            Err(RegistryError::FeedbackNotFound {
                agent_id: h.agent_id,
                index: 4
            })
        );
    }
}
