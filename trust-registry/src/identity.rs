//! Identity Registry: agent records, delegation and metadata
//!
//! Ids are assigned sequentially starting at 1 and never reused. Every
//! mutating call takes the [`CallContext`] the ledger built for it.

use ethers::types::Address;
use parking_lot::Mutex;

use crate::context::CallContext;
use crate::error::{RegistryError, RegistryResult};
use crate::events::{EventRecord, RegistryEvent};
use crate::store::{IdentityStore, IdentityWrite, WriteBatch};
use crate::types::{AgentRecord, MetadataEntry};

/// Owner / delegate / operator queries other registries depend on
pub trait IdentityLookup: Send + Sync {
    fn owner_of(&self, agent_id: u64) -> RegistryResult<Address>;

    /// `caller` is the owner, the record's delegate, or an operator of the owner.
    /// Fails with `AgentNotFound` for unknown ids.
    fn is_authorized(&self, caller: Address, agent_id: u64) -> RegistryResult<bool>;
}

pub struct IdentityRegistry {
    address: Address,
    store: Mutex<Box<dyn IdentityStore>>,
}

impl IdentityRegistry {
    pub fn new(address: Address, store: Box<dyn IdentityStore>) -> Self {
        Self {
            address,
            store: Mutex::new(store),
        }
    }

    /// Deployment address of this registry
    pub fn address(&self) -> Address {
        self.address
    }

    // ============================================
    // Registration
    // ============================================

    pub fn register(&self, ctx: &CallContext) -> RegistryResult<u64> {
        self.register_with_metadata(ctx, "", Vec::new())
    }

    pub fn register_with_uri(&self, ctx: &CallContext, uri: &str) -> RegistryResult<u64> {
        self.register_with_metadata(ctx, uri, Vec::new())
    }

    /// Register with a uri and seeded metadata; caller becomes the owner
    pub fn register_with_metadata(
        &self,
        ctx: &CallContext,
        uri: &str,
        metadata: Vec<MetadataEntry>,
    ) -> RegistryResult<u64> {
        let mut store = self.store.lock();
        let agent_id = store.agent_count()? + 1;

        let mut batch = WriteBatch::new();
        batch
            .write(IdentityWrite::PutAgent(AgentRecord {
                agent_id,
                owner: ctx.caller,
                delegate: None,
                uri: uri.to_string(),
            }))
            .emit(RegistryEvent::Registered {
                agent_id,
                uri: uri.to_string(),
                owner: ctx.caller,
            });
        let seeded = metadata.len();
        for entry in metadata {
            batch
                .write(IdentityWrite::PutMetadata {
                    agent_id,
                    key: entry.key.clone(),
                    value: entry.value.clone(),
                })
                .emit(RegistryEvent::MetadataSet {
                    agent_id,
                    key: entry.key,
                    value: entry.value,
                });
        }
        store.commit(batch)?;

        log::info!(
            "[IDENTITY] Agent {} registered by {:?} ({} metadata entries)",
            agent_id,
            ctx.caller,
            seeded
        );
        Ok(agent_id)
    }

    // ============================================
    // Owner / delegate mutations
    // ============================================

    pub fn set_metadata(
        &self,
        ctx: &CallContext,
        agent_id: u64,
        key: &str,
        value: Vec<u8>,
    ) -> RegistryResult<()> {
        let mut store = self.store.lock();
        let record = load_agent(store.as_ref(), agent_id)?;
        require_authorized(store.as_ref(), &record, ctx.caller)?;

        let mut batch = WriteBatch::new();
        batch
            .write(IdentityWrite::PutMetadata {
                agent_id,
                key: key.to_string(),
                value: value.clone(),
            })
            .emit(RegistryEvent::MetadataSet {
                agent_id,
                key: key.to_string(),
                value,
            });
        store.commit(batch)?;

        log::info!("[IDENTITY] Metadata '{}' set on agent {}", key, agent_id);
        Ok(())
    }

    pub fn set_uri(&self, ctx: &CallContext, agent_id: u64, new_uri: &str) -> RegistryResult<()> {
        let mut store = self.store.lock();
        let mut record = load_agent(store.as_ref(), agent_id)?;
        require_authorized(store.as_ref(), &record, ctx.caller)?;

        record.uri = new_uri.to_string();
        let mut batch = WriteBatch::new();
        batch
            .write(IdentityWrite::PutAgent(record))
            .emit(RegistryEvent::UriUpdated {
                agent_id,
                new_uri: new_uri.to_string(),
                updated_by: ctx.caller,
            });
        store.commit(batch)?;

        log::info!("[IDENTITY] Agent {} uri updated to {}", agent_id, new_uri);
        Ok(())
    }

    /// Name the single delegate for `agent_id`; the zero address clears it.
    /// Only the current owner may call this.
    pub fn approve(&self, ctx: &CallContext, agent_id: u64, delegate: Address) -> RegistryResult<()> {
        let mut store = self.store.lock();
        let mut record = load_agent(store.as_ref(), agent_id)?;
        if record.owner != ctx.caller {
            return Err(RegistryError::Unauthorized {
                caller: ctx.caller,
                agent_id,
            });
        }

        record.delegate = if delegate.is_zero() { None } else { Some(delegate) };
        let owner = record.owner;
        let mut batch = WriteBatch::new();
        batch
            .write(IdentityWrite::PutAgent(record))
            .emit(RegistryEvent::Approval {
                owner,
                delegate,
                agent_id,
            });
        store.commit(batch)?;

        log::info!("[IDENTITY] Agent {} delegate set to {:?}", agent_id, delegate);
        Ok(())
    }

    /// Blanket-approve (or revoke) `operator` across every record the caller owns
    pub fn set_approval_for_all(
        &self,
        ctx: &CallContext,
        operator: Address,
        approved: bool,
    ) -> RegistryResult<()> {
        if operator.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }
        let mut store = self.store.lock();

        let mut batch = WriteBatch::new();
        batch
            .write(IdentityWrite::SetOperator {
                owner: ctx.caller,
                operator,
                approved,
            })
            .emit(RegistryEvent::ApprovalForAll {
                owner: ctx.caller,
                operator,
                approved,
            });
        store.commit(batch)?;

        log::info!(
            "[IDENTITY] Operator {:?} {} for owner {:?}",
            operator,
            if approved { "approved" } else { "revoked" },
            ctx.caller
        );
        Ok(())
    }

    /// Move ownership to `to`. An existing delegate is kept and stays
    /// authorized under the new owner until it is explicitly cleared.
    pub fn transfer_from(&self, ctx: &CallContext, agent_id: u64, to: Address) -> RegistryResult<()> {
        if to.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }
        let mut store = self.store.lock();
        let mut record = load_agent(store.as_ref(), agent_id)?;
        require_authorized(store.as_ref(), &record, ctx.caller)?;

        let from = record.owner;
        record.owner = to;
        let mut batch = WriteBatch::new();
        batch
            .write(IdentityWrite::PutAgent(record))
            .emit(RegistryEvent::Transfer { from, to, agent_id });
        store.commit(batch)?;

        log::info!("[IDENTITY] Agent {} transferred {:?} -> {:?}", agent_id, from, to);
        Ok(())
    }

    // ============================================
    // Reads
    // ============================================

    pub fn agent(&self, agent_id: u64) -> RegistryResult<AgentRecord> {
        load_agent(self.store.lock().as_ref(), agent_id)
    }

    pub fn get_approved(&self, agent_id: u64) -> RegistryResult<Option<Address>> {
        Ok(self.agent(agent_id)?.delegate)
    }

    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> RegistryResult<bool> {
        self.store.lock().is_operator(owner, operator)
    }

    pub fn token_uri(&self, agent_id: u64) -> RegistryResult<String> {
        Ok(self.agent(agent_id)?.uri)
    }

    /// Unset keys read as an empty value
    pub fn get_metadata(&self, agent_id: u64, key: &str) -> RegistryResult<Vec<u8>> {
        Ok(self.store.lock().metadata(agent_id, key)?.unwrap_or_default())
    }

    pub fn get_metadata_batch(&self, agent_id: u64, keys: &[String]) -> RegistryResult<Vec<Vec<u8>>> {
        let store = self.store.lock();
        keys.iter()
            .map(|key| Ok(store.metadata(agent_id, key)?.unwrap_or_default()))
            .collect()
    }

    pub fn total_agents(&self) -> RegistryResult<u64> {
        self.store.lock().agent_count()
    }

    pub fn events_since(&self, after: u64) -> RegistryResult<Vec<EventRecord>> {
        self.store.lock().events_since(after)
    }
}

impl IdentityLookup for IdentityRegistry {
    fn owner_of(&self, agent_id: u64) -> RegistryResult<Address> {
        Ok(self.agent(agent_id)?.owner)
    }

    fn is_authorized(&self, caller: Address, agent_id: u64) -> RegistryResult<bool> {
        let store = self.store.lock();
        let record = load_agent(store.as_ref(), agent_id)?;
        authorized(store.as_ref(), &record, caller)
    }
}

fn load_agent(store: &dyn IdentityStore, agent_id: u64) -> RegistryResult<AgentRecord> {
    store
        .agent(agent_id)?
        .ok_or(RegistryError::AgentNotFound(agent_id))
}

fn authorized(store: &dyn IdentityStore, record: &AgentRecord, caller: Address) -> RegistryResult<bool> {
    if caller == record.owner || record.delegate == Some(caller) {
        return Ok(true);
    }
    store.is_operator(record.owner, caller)
}

fn require_authorized(store: &dyn IdentityStore, record: &AgentRecord, caller: Address) -> RegistryResult<()> {
    if authorized(store, record, caller)? {
        Ok(())
    } else {
        Err(RegistryError::Unauthorized {
            caller,
            agent_id: record.agent_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use ethers::types::U256;

    const OWNER: Address = Address::repeat_byte(0x01);
    const DELEGATE: Address = Address::repeat_byte(0x02);
    const OPERATOR: Address = Address::repeat_byte(0x03);
    const STRANGER: Address = Address::repeat_byte(0x04);

    fn ctx(caller: Address) -> CallContext {
        CallContext::new(caller, 1_700_000_000, U256::from(31337))
    }

    fn registry() -> IdentityRegistry {
        IdentityRegistry::new(Address::repeat_byte(0x1d), Box::new(MemoryStore::new()))
    }

    #[test]
    fn test_register_assigns_sequential_ids() {
        let reg = registry();
        assert_eq!(reg.total_agents().unwrap(), 0);
        assert_eq!(reg.register(&ctx(OWNER)).unwrap(), 1);
        assert_eq!(reg.register_with_uri(&ctx(STRANGER), "ipfs://agent").unwrap(), 2);
        assert_eq!(reg.total_agents().unwrap(), 2);
        assert_eq!(reg.owner_of(2).unwrap(), STRANGER);
        assert_eq!(reg.token_uri(2).unwrap(), "ipfs://agent");
        assert_eq!(reg.owner_of(3), Err(RegistryError::AgentNotFound(3)));
    }

    #[test]
    fn test_register_with_metadata_emits_events() {
        let reg = registry();
        let id = reg
            .register_with_metadata(
                &ctx(OWNER),
                "ipfs://a",
                vec![MetadataEntry::new("name", b"alpha".to_vec()), MetadataEntry::new("wallet", vec![1, 2])],
            )
            .unwrap();

        assert_eq!(reg.get_metadata(id, "name").unwrap(), b"alpha".to_vec());
        assert_eq!(
            reg.get_metadata_batch(id, &["wallet".to_string(), "missing".to_string()])
                .unwrap(),
            vec![vec![1, 2], Vec::new()]
        );
        let names: Vec<_> = reg
            .events_since(0)
            .unwrap()
            .iter()
            .map(|r| r.event.name())
            .collect();
        assert_eq!(names, vec!["Registered", "MetadataSet", "MetadataSet"]);
    }

    #[test]
    fn test_authorization_predicate() {
        let reg = registry();
        let id = reg.register(&ctx(OWNER)).unwrap();

        assert!(reg.is_authorized(OWNER, id).unwrap());
        assert!(!reg.is_authorized(DELEGATE, id).unwrap());

        reg.approve(&ctx(OWNER), id, DELEGATE).unwrap();
        assert_eq!(reg.get_approved(id).unwrap(), Some(DELEGATE));
        assert!(reg.is_authorized(DELEGATE, id).unwrap());

        reg.set_approval_for_all(&ctx(OWNER), OPERATOR, true).unwrap();
        assert!(reg.is_approved_for_all(OWNER, OPERATOR).unwrap());
        assert!(reg.is_authorized(OPERATOR, id).unwrap());
        assert!(!reg.is_authorized(STRANGER, id).unwrap());

        reg.set_approval_for_all(&ctx(OWNER), OPERATOR, false).unwrap();
        assert!(!reg.is_authorized(OPERATOR, id).unwrap());
        assert!(reg.is_authorized(OWNER, 99).is_err());
    }

    #[test]
    fn test_only_owner_approves() {
        let reg = registry();
        let id = reg.register(&ctx(OWNER)).unwrap();
        reg.approve(&ctx(OWNER), id, DELEGATE).unwrap();

        let err = reg.approve(&ctx(DELEGATE), id, STRANGER).unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized { .. }));

        reg.approve(&ctx(OWNER), id, Address::zero()).unwrap();
        assert_eq!(reg.get_approved(id).unwrap(), None);
        assert!(reg.set_approval_for_all(&ctx(OWNER), Address::zero(), true).is_err());
    }

    #[test]
    fn test_set_uri_and_metadata_require_authorization() {
        let reg = registry();
        let id = reg.register(&ctx(OWNER)).unwrap();

        assert!(matches!(
            reg.set_uri(&ctx(STRANGER), id, "ipfs://evil"),
            Err(RegistryError::Unauthorized { .. })
        ));
        assert!(reg.set_metadata(&ctx(STRANGER), id, "k", vec![1]).is_err());

        reg.approve(&ctx(OWNER), id, DELEGATE).unwrap();
        reg.set_uri(&ctx(DELEGATE), id, "ipfs://new").unwrap();
        reg.set_metadata(&ctx(DELEGATE), id, "k", vec![9]).unwrap();
        assert_eq!(reg.token_uri(id).unwrap(), "ipfs://new");
        assert_eq!(reg.get_metadata(id, "k").unwrap(), vec![9]);

        assert_eq!(
            reg.set_uri(&ctx(OWNER), 42, "x"),
            Err(RegistryError::AgentNotFound(42))
        );
    }

    #[test]
    fn test_transfer_keeps_delegate() {
        let reg = registry();
        let id = reg.register(&ctx(OWNER)).unwrap();
        reg.approve(&ctx(OWNER), id, DELEGATE).unwrap();

        assert!(reg.transfer_from(&ctx(STRANGER), id, STRANGER).is_err());
        assert_eq!(
            reg.transfer_from(&ctx(OWNER), id, Address::zero()),
            Err(RegistryError::ZeroAddress)
        );

        reg.transfer_from(&ctx(OWNER), id, STRANGER).unwrap();
        assert_eq!(reg.owner_of(id).unwrap(), STRANGER);
        assert!(!reg.is_authorized(OWNER, id).unwrap());
        // The previous owner's delegate is still in place
        assert!(reg.is_authorized(DELEGATE, id).unwrap());
        assert_eq!(reg.get_approved(id).unwrap(), Some(DELEGATE));
    }
}
