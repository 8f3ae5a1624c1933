//! Ledger: the three registries behind one serialized execution point
//!
//! Every operation takes the execution lock, gets its timestamp from the
//! ledger clock, runs to completion, and only then lets the next one in.
//! Callers supply who they are, never what time it is.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ethers::types::{Address, H256, U256};
use parking_lot::Mutex;

use crate::config::RegistryConfig;
use crate::context::{CallContext, Clock, SystemClock};
use crate::db::Database;
use crate::error::{ErrorKind, RegistryResult};
use crate::events::EventRecord;
use crate::identity::{IdentityLookup, IdentityRegistry};
use crate::reputation::{FeedbackSubmission, ReputationRegistry};
use crate::signature::SignerDirectory;
use crate::store::{IdentityStore, MemoryStore, ReputationStore, ValidationStore};
use crate::types::{AgentRecord, FeedbackEntry, MetadataEntry, ValidationRecord, ValidationRequest, ValidationResponse};
use crate::validation::ValidationRegistry;

/// Which registry an event stream belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registry {
    Identity,
    Reputation,
    Validation,
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Registry::Identity => write!(f, "identity"),
            Registry::Reputation => write!(f, "reputation"),
            Registry::Validation => write!(f, "validation"),
        }
    }
}

impl FromStr for Registry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(Registry::Identity),
            "reputation" => Ok(Registry::Reputation),
            "validation" => Ok(Registry::Validation),
            _ => Err(format!("Unknown registry: {}", s)),
        }
    }
}

/// Backing stores for one ledger
pub struct LedgerStores {
    pub identity: Box<dyn IdentityStore>,
    pub reputation: Box<dyn ReputationStore>,
    pub validation: Box<dyn ValidationStore>,
}

impl LedgerStores {
    pub fn in_memory() -> Self {
        Self {
            identity: Box::new(MemoryStore::new()),
            reputation: Box::new(MemoryStore::new()),
            validation: Box::new(MemoryStore::new()),
        }
    }

    /// All three registries in one SQLite file, one connection each
    pub fn sqlite(path: &str) -> RegistryResult<Self> {
        Ok(Self {
            identity: Box::new(Database::scoped(path, "identity")?),
            reputation: Box::new(Database::scoped(path, "reputation")?),
            validation: Box::new(Database::scoped(path, "validation")?),
        })
    }
}

pub struct Ledger {
    identity: Arc<IdentityRegistry>,
    reputation: ReputationRegistry,
    validation: ValidationRegistry,
    clock: Arc<dyn Clock>,
    network_id: U256,
    exec: Mutex<()>,
}

impl Ledger {
    pub fn new(
        config: &RegistryConfig,
        stores: LedgerStores,
        signers: Arc<dyn SignerDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let identity = Arc::new(IdentityRegistry::new(config.identity_address, stores.identity));
        let lookup: Arc<dyn IdentityLookup> = identity.clone();
        let reputation = ReputationRegistry::new(
            config.reputation_address,
            lookup.clone(),
            signers,
            stores.reputation,
        );
        let validation = ValidationRegistry::new(config.validation_address, lookup, stores.validation);

        log::info!(
            "[LEDGER] Network {} identity={:?} reputation={:?} validation={:?}",
            config.network_id,
            config.identity_address,
            config.reputation_address,
            config.validation_address
        );

        Self {
            identity,
            reputation,
            validation,
            clock,
            network_id: config.network_id,
            exec: Mutex::new(()),
        }
    }

    /// SQLite at `config.db_path`, wall-clock time
    pub fn open(config: &RegistryConfig, signers: Arc<dyn SignerDirectory>) -> RegistryResult<Self> {
        let stores = LedgerStores::sqlite(&config.db_path)?;
        Ok(Self::new(config, stores, signers, Arc::new(SystemClock::new())))
    }

    pub fn network_id(&self) -> U256 {
        self.network_id
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn identity_address(&self) -> Address {
        self.identity.address()
    }

    pub fn reputation_address(&self) -> Address {
        self.reputation.address()
    }

    pub fn validation_address(&self) -> Address {
        self.validation.address()
    }

    /// Run one operation as a single ledger step
    fn execute<T>(&self, op: &str, caller: Address, f: impl FnOnce(&CallContext) -> RegistryResult<T>) -> RegistryResult<T> {
        let _step = self.exec.lock();
        let ctx = CallContext::new(caller, self.clock.now(), self.network_id);
        f(&ctx).inspect_err(|e| match e.kind() {
            ErrorKind::Storage => log::error!("[LEDGER] {} from {:?} failed: {}", op, caller, e),
            _ => log::debug!("[LEDGER] {} from {:?} rejected: {}", op, caller, e),
        })
    }

    /// Reads see only fully committed steps
    fn read<T>(&self, f: impl FnOnce() -> RegistryResult<T>) -> RegistryResult<T> {
        let _step = self.exec.lock();
        f()
    }

    // ============================================
    // Identity
    // ============================================

    pub fn register(&self, caller: Address) -> RegistryResult<u64> {
        self.execute("register", caller, |ctx| self.identity.register(ctx))
    }

    pub fn register_with_uri(&self, caller: Address, uri: &str) -> RegistryResult<u64> {
        self.execute("register", caller, |ctx| self.identity.register_with_uri(ctx, uri))
    }

    pub fn register_with_metadata(&self, caller: Address, uri: &str, metadata: Vec<MetadataEntry>) -> RegistryResult<u64> {
        self.execute("register", caller, |ctx| {
            self.identity.register_with_metadata(ctx, uri, metadata)
        })
    }

    pub fn set_metadata(&self, caller: Address, agent_id: u64, key: &str, value: Vec<u8>) -> RegistryResult<()> {
        self.execute("set_metadata", caller, |ctx| {
            self.identity.set_metadata(ctx, agent_id, key, value)
        })
    }

    pub fn set_uri(&self, caller: Address, agent_id: u64, new_uri: &str) -> RegistryResult<()> {
        self.execute("set_uri", caller, |ctx| self.identity.set_uri(ctx, agent_id, new_uri))
    }

    pub fn approve(&self, caller: Address, agent_id: u64, delegate: Address) -> RegistryResult<()> {
        self.execute("approve", caller, |ctx| self.identity.approve(ctx, agent_id, delegate))
    }

    pub fn set_approval_for_all(&self, caller: Address, operator: Address, approved: bool) -> RegistryResult<()> {
        self.execute("set_approval_for_all", caller, |ctx| {
            self.identity.set_approval_for_all(ctx, operator, approved)
        })
    }

    pub fn transfer_from(&self, caller: Address, agent_id: u64, to: Address) -> RegistryResult<()> {
        self.execute("transfer_from", caller, |ctx| self.identity.transfer_from(ctx, agent_id, to))
    }

    pub fn owner_of(&self, agent_id: u64) -> RegistryResult<Address> {
        self.read(|| self.identity.owner_of(agent_id))
    }

    pub fn get_approved(&self, agent_id: u64) -> RegistryResult<Option<Address>> {
        self.read(|| self.identity.get_approved(agent_id))
    }

    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> RegistryResult<bool> {
        self.read(|| self.identity.is_approved_for_all(owner, operator))
    }

    pub fn is_authorized(&self, caller: Address, agent_id: u64) -> RegistryResult<bool> {
        self.read(|| self.identity.is_authorized(caller, agent_id))
    }

    pub fn agent(&self, agent_id: u64) -> RegistryResult<AgentRecord> {
        self.read(|| self.identity.agent(agent_id))
    }

    pub fn token_uri(&self, agent_id: u64) -> RegistryResult<String> {
        self.read(|| self.identity.token_uri(agent_id))
    }

    pub fn get_metadata(&self, agent_id: u64, key: &str) -> RegistryResult<Vec<u8>> {
        self.read(|| self.identity.get_metadata(agent_id, key))
    }

    pub fn get_metadata_batch(&self, agent_id: u64, keys: &[String]) -> RegistryResult<Vec<Vec<u8>>> {
        self.read(|| self.identity.get_metadata_batch(agent_id, keys))
    }

    pub fn total_agents(&self) -> RegistryResult<u64> {
        self.read(|| self.identity.total_agents())
    }

    // ============================================
    // Reputation
    // ============================================

    pub fn give_feedback(&self, caller: Address, submission: FeedbackSubmission) -> RegistryResult<u64> {
        self.execute("give_feedback", caller, |ctx| self.reputation.give_feedback(ctx, submission))
    }

    pub fn get_feedback(&self, agent_id: u64, index: u64) -> RegistryResult<FeedbackEntry> {
        self.read(|| self.reputation.get_feedback(agent_id, index))
    }

    pub fn get_feedback_batch(&self, agent_id: u64, start: u64, end: u64) -> RegistryResult<Vec<FeedbackEntry>> {
        self.read(|| self.reputation.get_feedback_batch(agent_id, start, end))
    }

    pub fn feedback_count(&self, agent_id: u64) -> RegistryResult<u64> {
        self.read(|| self.reputation.feedback_count(agent_id))
    }

    pub fn get_average_score(&self, agent_id: u64) -> RegistryResult<(u64, u64)> {
        self.read(|| self.reputation.get_average_score(agent_id))
    }

    pub fn get_feedback_count_by_tag(&self, agent_id: u64, tag: H256) -> RegistryResult<u64> {
        self.read(|| self.reputation.get_feedback_count_by_tag(agent_id, tag))
    }

    pub fn get_feedback_by_client(&self, agent_id: u64, client: Address) -> RegistryResult<Vec<FeedbackEntry>> {
        self.read(|| self.reputation.get_feedback_by_client(agent_id, client))
    }

    pub fn get_auth_usage(&self, agent_id: U256, client: Address, index_limit: u64, expiry: U256) -> RegistryResult<u64> {
        self.read(|| self.reputation.get_auth_usage(agent_id, client, index_limit, expiry))
    }

    // ============================================
    // Validation
    // ============================================

    pub fn request_validation(&self, caller: Address, agent_id: u64, request_uri: &str, request_hash: H256) -> RegistryResult<u64> {
        self.execute("request_validation", caller, |ctx| {
            self.validation.request_validation(ctx, agent_id, request_uri, request_hash)
        })
    }

    pub fn respond_to_validation(
        &self,
        caller: Address,
        request_id: u64,
        response_uri: &str,
        response_hash: H256,
        is_valid: bool,
    ) -> RegistryResult<()> {
        self.execute("respond_to_validation", caller, |ctx| {
            self.validation
                .respond_to_validation(ctx, request_id, response_uri, response_hash, is_valid)
        })
    }

    pub fn cancel_validation(&self, caller: Address, request_id: u64) -> RegistryResult<()> {
        self.execute("cancel_validation", caller, |ctx| {
            self.validation.cancel_validation(ctx, request_id)
        })
    }

    pub fn get_request(&self, request_id: u64) -> RegistryResult<ValidationRequest> {
        self.read(|| self.validation.get_request(request_id))
    }

    pub fn get_response(&self, request_id: u64) -> RegistryResult<ValidationResponse> {
        self.read(|| self.validation.get_response(request_id))
    }

    pub fn get_validation(&self, request_id: u64) -> RegistryResult<ValidationRecord> {
        self.read(|| self.validation.get_record(request_id))
    }

    pub fn get_agent_requests(&self, agent_id: u64) -> RegistryResult<Vec<u64>> {
        self.read(|| self.validation.get_agent_requests(agent_id))
    }

    pub fn get_client_requests(&self, client: Address) -> RegistryResult<Vec<u64>> {
        self.read(|| self.validation.get_client_requests(client))
    }

    pub fn get_pending_request_count(&self, agent_id: u64) -> RegistryResult<u64> {
        self.read(|| self.validation.get_pending_request_count(agent_id))
    }

    pub fn total_requests(&self) -> RegistryResult<u64> {
        self.read(|| self.validation.total_requests())
    }

    // ============================================
    // Events
    // ============================================

    pub fn events_since(&self, registry: Registry, after: u64) -> RegistryResult<Vec<EventRecord>> {
        self.read(|| match registry {
            Registry::Identity => self.identity.events_since(after),
            Registry::Reputation => self.reputation.events_since(after),
            Registry::Validation => self.validation.events_since(after),
        })
    }
}
