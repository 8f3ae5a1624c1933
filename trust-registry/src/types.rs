//! Registry record types

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

/// Portable agent identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: u64,
    pub owner: Address,
    /// Single per-record delegate (ERC-721 style `approve`)
    pub delegate: Option<Address>,
    pub uri: String,
}

/// Key/value metadata seeded at registration or set later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Immutable feedback entry, addressed by `(agent_id, index)` with 1-based index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub agent_id: u64,
    pub index: u64,
    pub client: Address,
    pub score: u8,
    pub tag1: H256,
    pub tag2: H256,
    pub content_uri: String,
    pub content_hash: H256,
    pub timestamp: u64,
}

impl FeedbackEntry {
    pub fn has_tag(&self, tag: H256) -> bool {
        self.tag1 == tag || self.tag2 == tag
    }
}

/// Build a fixed-width tag from a short label, right-padded with zeros.
/// Labels longer than 32 bytes are truncated.
pub fn tag(label: &str) -> H256 {
    let mut out = [0u8; 32];
    let bytes = label.as_bytes();
    let len = bytes.len().min(32);
    out[..len].copy_from_slice(&bytes[..len]);
    H256::from(out)
}

/// Readable form of a tag (trailing zero bytes stripped)
pub fn tag_label(tag: &H256) -> String {
    let bytes = tag.as_bytes();
    let end = bytes.iter().rposition(|b| *b != 0).map(|i| i + 1).unwrap_or(0);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Lifecycle of a validation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Waiting for the agent's owner or delegate
    Pending,
    /// Answered (terminal)
    Responded,
    /// Withdrawn by the requester (terminal)
    Cancelled,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationStatus::Pending => write!(f, "pending"),
            ValidationStatus::Responded => write!(f, "responded"),
            ValidationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ValidationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ValidationStatus::Pending),
            "responded" => Ok(ValidationStatus::Responded),
            "cancelled" => Ok(ValidationStatus::Cancelled),
            _ => Err(format!("Unknown validation status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub request_id: u64,
    pub agent_id: u64,
    /// Requester; the only principal allowed to cancel
    pub client: Address,
    pub request_uri: String,
    pub request_hash: H256,
    pub timestamp: u64,
    pub status: ValidationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub response_uri: String,
    pub response_hash: H256,
    pub timestamp: u64,
    pub is_valid: bool,
}

/// A request together with its response, if one was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub request: ValidationRequest,
    pub response: Option<ValidationResponse>,
}
