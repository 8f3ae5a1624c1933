//! Ledger state storage
//!
//! Each registry owns one store behind a trait object so the same registry
//! code runs over the in-memory tables (tests, embedding) or SQLite (the
//! service). Reads are fine-grained; writes only happen through `commit`,
//! which applies a whole [`WriteBatch`] (state plus events) or nothing.

mod memory;

pub use memory::MemoryStore;

use ethers::types::{Address, H256};

use crate::error::RegistryResult;
use crate::events::{EventRecord, RegistryEvent};
use crate::types::{AgentRecord, FeedbackEntry, ValidationRecord, ValidationRequest};

/// State writes and events produced by one operation
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch<W> {
    pub writes: Vec<W>,
    pub events: Vec<RegistryEvent>,
}

impl<W> WriteBatch<W> {
    pub fn new() -> Self {
        Self {
            writes: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn write(&mut self, write: W) -> &mut Self {
        self.writes.push(write);
        self
    }

    pub fn emit(&mut self, event: RegistryEvent) -> &mut Self {
        self.events.push(event);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.events.is_empty()
    }
}

impl<W> Default for WriteBatch<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IdentityWrite {
    /// Insert or replace an agent record
    PutAgent(AgentRecord),
    SetOperator {
        owner: Address,
        operator: Address,
        approved: bool,
    },
    PutMetadata {
        agent_id: u64,
        key: String,
        value: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReputationWrite {
    /// Append an entry; its index must be the agent's current count + 1
    AppendFeedback(FeedbackEntry),
    SetAuthUsage { key: H256, count: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWrite {
    /// New request; also indexed under its agent and client
    InsertRequest(ValidationRequest),
    /// Replace the stored request/response pair of an existing request
    UpdateRecord(ValidationRecord),
}

/// Append-only event log kept next to the state it describes
pub trait EventLog {
    /// Events with sequence number strictly greater than `after`, in order
    fn events_since(&self, after: u64) -> RegistryResult<Vec<EventRecord>>;
}

pub trait IdentityStore: EventLog + Send {
    fn agent(&self, agent_id: u64) -> RegistryResult<Option<AgentRecord>>;

    /// Number of registered agents; ids run 1..=count
    fn agent_count(&self) -> RegistryResult<u64>;

    fn is_operator(&self, owner: Address, operator: Address) -> RegistryResult<bool>;

    fn metadata(&self, agent_id: u64, key: &str) -> RegistryResult<Option<Vec<u8>>>;

    fn commit(&mut self, batch: WriteBatch<IdentityWrite>) -> RegistryResult<()>;
}

pub trait ReputationStore: EventLog + Send {
    fn feedback(&self, agent_id: u64, index: u64) -> RegistryResult<Option<FeedbackEntry>>;

    fn feedback_count(&self, agent_id: u64) -> RegistryResult<u64>;

    /// Entries `start..=end`; callers bounds-check against `feedback_count`
    fn feedback_range(&self, agent_id: u64, start: u64, end: u64) -> RegistryResult<Vec<FeedbackEntry>> {
        let mut entries = Vec::new();
        for index in start..=end {
            if let Some(entry) = self.feedback(agent_id, index)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn auth_usage(&self, key: H256) -> RegistryResult<u64>;

    fn commit(&mut self, batch: WriteBatch<ReputationWrite>) -> RegistryResult<()>;
}

pub trait ValidationStore: EventLog + Send {
    fn record(&self, request_id: u64) -> RegistryResult<Option<ValidationRecord>>;

    /// Number of requests ever made; ids run 1..=count
    fn request_count(&self) -> RegistryResult<u64>;

    fn agent_requests(&self, agent_id: u64) -> RegistryResult<Vec<u64>>;

    fn client_requests(&self, client: Address) -> RegistryResult<Vec<u64>>;

    fn commit(&mut self, batch: WriteBatch<ValidationWrite>) -> RegistryResult<()>;
}
