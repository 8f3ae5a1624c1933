//! In-memory tables for all three registries.
//!
//! A single `MemoryStore` can back any of the registries; give each registry
//! its own instance, the same way each deployment owns its own storage.

use std::collections::{HashMap, HashSet};

use ethers::types::{Address, H256};

use super::{
    EventLog, IdentityStore, IdentityWrite, ReputationStore, ReputationWrite, ValidationStore,
    ValidationWrite, WriteBatch,
};
use crate::error::{RegistryError, RegistryResult};
use crate::events::{EventRecord, RegistryEvent};
use crate::types::{AgentRecord, FeedbackEntry, ValidationRecord};

#[derive(Debug, Default)]
pub struct MemoryStore {
    // Identity
    agents: HashMap<u64, AgentRecord>,
    operators: HashSet<(Address, Address)>,
    metadata: HashMap<(u64, String), Vec<u8>>,

    // Reputation: agent_id -> entries, position i holds index i + 1
    feedback: HashMap<u64, Vec<FeedbackEntry>>,
    auth_usage: HashMap<H256, u64>,

    // Validation
    requests: HashMap<u64, ValidationRecord>,
    agent_requests: HashMap<u64, Vec<u64>>,
    client_requests: HashMap<Address, Vec<u64>>,

    events: Vec<EventRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn append_events(&mut self, events: Vec<RegistryEvent>) {
        for event in events {
            let seq = self.events.len() as u64 + 1;
            self.events.push(EventRecord { seq, event });
        }
    }
}

impl EventLog for MemoryStore {
    fn events_since(&self, after: u64) -> RegistryResult<Vec<EventRecord>> {
        Ok(self
            .events
            .iter()
            .filter(|r| r.seq > after)
            .cloned()
            .collect())
    }
}

impl IdentityStore for MemoryStore {
    fn agent(&self, agent_id: u64) -> RegistryResult<Option<AgentRecord>> {
        Ok(self.agents.get(&agent_id).cloned())
    }

    fn agent_count(&self) -> RegistryResult<u64> {
        Ok(self.agents.len() as u64)
    }

    fn is_operator(&self, owner: Address, operator: Address) -> RegistryResult<bool> {
        Ok(self.operators.contains(&(owner, operator)))
    }

    fn metadata(&self, agent_id: u64, key: &str) -> RegistryResult<Option<Vec<u8>>> {
        Ok(self.metadata.get(&(agent_id, key.to_string())).cloned())
    }

    fn commit(&mut self, batch: WriteBatch<IdentityWrite>) -> RegistryResult<()> {
        for write in batch.writes {
            match write {
                IdentityWrite::PutAgent(record) => {
                    self.agents.insert(record.agent_id, record);
                }
                IdentityWrite::SetOperator {
                    owner,
                    operator,
                    approved,
                } => {
                    if approved {
                        self.operators.insert((owner, operator));
                    } else {
                        self.operators.remove(&(owner, operator));
                    }
                }
                IdentityWrite::PutMetadata {
                    agent_id,
                    key,
                    value,
                } => {
                    self.metadata.insert((agent_id, key), value);
                }
            }
        }
        self.append_events(batch.events);
        Ok(())
    }
}

impl ReputationStore for MemoryStore {
    fn feedback(&self, agent_id: u64, index: u64) -> RegistryResult<Option<FeedbackEntry>> {
        if index == 0 {
            return Ok(None);
        }
        Ok(self
            .feedback
            .get(&agent_id)
            .and_then(|entries| entries.get((index - 1) as usize))
            .cloned())
    }

    fn feedback_count(&self, agent_id: u64) -> RegistryResult<u64> {
        Ok(self
            .feedback
            .get(&agent_id)
            .map(|entries| entries.len() as u64)
            .unwrap_or(0))
    }

    fn feedback_range(&self, agent_id: u64, start: u64, end: u64) -> RegistryResult<Vec<FeedbackEntry>> {
        let Some(entries) = self.feedback.get(&agent_id) else {
            return Ok(Vec::new());
        };
        if start == 0 || start > end {
            return Ok(Vec::new());
        }
        let from = (start - 1) as usize;
        let to = (end as usize).min(entries.len());
        Ok(entries.get(from..to).map(|s| s.to_vec()).unwrap_or_default())
    }

    fn auth_usage(&self, key: H256) -> RegistryResult<u64> {
        Ok(self.auth_usage.get(&key).copied().unwrap_or(0))
    }

    fn commit(&mut self, batch: WriteBatch<ReputationWrite>) -> RegistryResult<()> {
        // Index gaps would break 1..=count addressing; check before touching anything
        let mut pending: HashMap<u64, u64> = HashMap::new();
        for write in &batch.writes {
            if let ReputationWrite::AppendFeedback(entry) = write {
                let count = pending
                    .entry(entry.agent_id)
                    .or_insert_with(|| self.feedback.get(&entry.agent_id).map(|e| e.len() as u64).unwrap_or(0));
                if entry.index != *count + 1 {
                    return Err(RegistryError::Storage(format!(
                        "feedback index {} out of sequence for agent {} (count {})",
                        entry.index, entry.agent_id, count
                    )));
                }
                *count += 1;
            }
        }

        for write in batch.writes {
            match write {
                ReputationWrite::AppendFeedback(entry) => {
                    self.feedback.entry(entry.agent_id).or_default().push(entry);
                }
                ReputationWrite::SetAuthUsage { key, count } => {
                    self.auth_usage.insert(key, count);
                }
            }
        }
        self.append_events(batch.events);
        Ok(())
    }
}

impl ValidationStore for MemoryStore {
    fn record(&self, request_id: u64) -> RegistryResult<Option<ValidationRecord>> {
        Ok(self.requests.get(&request_id).cloned())
    }

    fn request_count(&self) -> RegistryResult<u64> {
        Ok(self.requests.len() as u64)
    }

    fn agent_requests(&self, agent_id: u64) -> RegistryResult<Vec<u64>> {
        Ok(self.agent_requests.get(&agent_id).cloned().unwrap_or_default())
    }

    fn client_requests(&self, client: Address) -> RegistryResult<Vec<u64>> {
        Ok(self.client_requests.get(&client).cloned().unwrap_or_default())
    }

    fn commit(&mut self, batch: WriteBatch<ValidationWrite>) -> RegistryResult<()> {
        for write in &batch.writes {
            if let ValidationWrite::UpdateRecord(record) = write {
                if !self.requests.contains_key(&record.request.request_id) {
                    return Err(RegistryError::Storage(format!(
                        "update of unknown validation request {}",
                        record.request.request_id
                    )));
                }
            }
        }

        for write in batch.writes {
            match write {
                ValidationWrite::InsertRequest(request) => {
                    let id = request.request_id;
                    self.agent_requests.entry(request.agent_id).or_default().push(id);
                    self.client_requests.entry(request.client).or_default().push(id);
                    self.requests.insert(
                        id,
                        ValidationRecord {
                            request,
                            response: None,
                        },
                    );
                }
                ValidationWrite::UpdateRecord(record) => {
                    self.requests.insert(record.request.request_id, record);
                }
            }
        }
        self.append_events(batch.events);
        Ok(())
    }
}
