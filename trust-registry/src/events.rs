//! Events emitted by committed registry operations

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    // Identity
    Registered {
        agent_id: u64,
        uri: String,
        owner: Address,
    },
    MetadataSet {
        agent_id: u64,
        key: String,
        value: Vec<u8>,
    },
    UriUpdated {
        agent_id: u64,
        new_uri: String,
        updated_by: Address,
    },
    Approval {
        owner: Address,
        delegate: Address,
        agent_id: u64,
    },
    ApprovalForAll {
        owner: Address,
        operator: Address,
        approved: bool,
    },
    Transfer {
        from: Address,
        to: Address,
        agent_id: u64,
    },

    // Reputation
    NewFeedback {
        agent_id: u64,
        index: u64,
        client: Address,
        score: u8,
        tag1: H256,
        tag2: H256,
        content_uri: String,
        content_hash: H256,
        timestamp: u64,
    },

    // Validation
    ValidationRequested {
        request_id: u64,
        agent_id: u64,
        client: Address,
        request_uri: String,
        request_hash: H256,
    },
    ValidationResponded {
        request_id: u64,
        agent_id: u64,
        responder: Address,
        response_uri: String,
        response_hash: H256,
        is_valid: bool,
    },
    ValidationCancelled {
        request_id: u64,
        agent_id: u64,
        client: Address,
    },
}

impl RegistryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::Registered { .. } => "Registered",
            RegistryEvent::MetadataSet { .. } => "MetadataSet",
            RegistryEvent::UriUpdated { .. } => "UriUpdated",
            RegistryEvent::Approval { .. } => "Approval",
            RegistryEvent::ApprovalForAll { .. } => "ApprovalForAll",
            RegistryEvent::Transfer { .. } => "Transfer",
            RegistryEvent::NewFeedback { .. } => "NewFeedback",
            RegistryEvent::ValidationRequested { .. } => "ValidationRequested",
            RegistryEvent::ValidationResponded { .. } => "ValidationResponded",
            RegistryEvent::ValidationCancelled { .. } => "ValidationCancelled",
        }
    }
}

/// An event as persisted, with its store-wide sequence number (1-based)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub event: RegistryEvent,
}
