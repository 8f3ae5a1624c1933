//! Shared types for the trust registry service and its RPC clients.
//!
//! Addresses, hashes and byte strings travel as 0x-prefixed hex strings.
//! Integers wider than 64 bits travel as decimal strings.

use serde::{Deserialize, Serialize};

// =====================================================
// Domain Views
// =====================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub agent_id: u64,
    pub owner: String,
    pub delegate: Option<String>,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataPair {
    pub key: String,
    /// Hex-encoded value
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackView {
    pub agent_id: u64,
    pub index: u64,
    pub client: String,
    pub score: u8,
    pub tag1: String,
    pub tag2: String,
    /// Readable forms of the tags (trailing zero bytes dropped)
    pub tag1_label: String,
    pub tag2_label: String,
    pub content_uri: String,
    pub content_hash: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageScore {
    /// Mean score times 100 (two implied decimals)
    pub average_x100: u64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResponseView {
    pub response_uri: String,
    pub response_hash: String,
    pub timestamp: u64,
    pub is_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationView {
    pub request_id: u64,
    pub agent_id: u64,
    pub client: String,
    pub request_uri: String,
    pub request_hash: String,
    pub timestamp: u64,
    /// "pending", "responded" or "cancelled"
    pub status: String,
    pub response: Option<ValidationResponseView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventView {
    pub seq: u64,
    pub name: String,
    pub payload: serde_json::Value,
}

// =====================================================
// RPC Request Types: identity
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub from: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub metadata: Vec<MetadataPair>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetMetadataRequest {
    pub from: String,
    pub agent_id: u64,
    pub key: String,
    /// Hex-encoded value
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetUriRequest {
    pub from: String,
    pub agent_id: u64,
    pub uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub from: String,
    pub agent_id: u64,
    /// Zero address clears the delegate
    pub delegate: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetApprovalForAllRequest {
    pub from: String,
    pub operator: String,
    pub approved: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: String,
    pub agent_id: u64,
    pub to: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentRequest {
    pub agent_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetadataRequest {
    pub agent_id: u64,
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetadataBatchRequest {
    pub agent_id: u64,
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApprovedForAllRequest {
    pub owner: String,
    pub operator: String,
}

// =====================================================
// RPC Request Types: reputation
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct GiveFeedbackRequest {
    pub from: String,
    pub agent_id: u64,
    pub score: u8,
    /// Short label or 0x-prefixed 32-byte hex; empty means zero
    #[serde(default)]
    pub tag1: String,
    #[serde(default)]
    pub tag2: String,
    #[serde(default)]
    pub content_uri: String,
    #[serde(default)]
    pub content_hash: Option<String>,
    /// Hex of the 289-byte signed authorization
    pub feedback_auth: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub agent_id: u64,
    pub index: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackBatchRequest {
    pub agent_id: u64,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackByClientRequest {
    pub agent_id: u64,
    pub client: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountByTagRequest {
    pub agent_id: u64,
    pub tag: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthUsageRequest {
    /// Decimal uint256
    pub agent_id: String,
    pub client: String,
    pub index_limit: u64,
    /// Decimal uint256
    pub expiry: String,
}

// =====================================================
// RPC Request Types: validation
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestValidationRequest {
    pub from: String,
    pub agent_id: u64,
    pub request_uri: String,
    pub request_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RespondValidationRequest {
    pub from: String,
    pub request_id: u64,
    pub response_uri: String,
    pub response_hash: String,
    pub is_valid: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelValidationRequest {
    pub from: String,
    pub request_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationIdRequest {
    pub request_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClientRequestsRequest {
    pub client: String,
}

// =====================================================
// Events
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsQuery {
    /// "identity", "reputation" or "validation"
    pub registry: String,
    #[serde(default)]
    pub after: u64,
}

// =====================================================
// RPC Response Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> RpcResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// =====================================================
// Service Status
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub uptime_secs: u64,
    /// Decimal network id
    pub network_id: String,
    pub identity_address: String,
    pub reputation_address: String,
    pub validation_address: String,
    pub total_agents: u64,
    pub total_requests: u64,
    /// Ledger clock, RFC 3339
    pub ledger_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_response_skips_empty_fields() {
        let ok = serde_json::to_value(RpcResponse::ok(7u64)).unwrap();
        assert_eq!(ok, serde_json::json!({ "success": true, "data": 7 }));

        let err = serde_json::to_value(RpcResponse::<u64>::err("nope")).unwrap();
        assert_eq!(err, serde_json::json!({ "success": false, "error": "nope" }));
    }

    #[test]
    fn test_register_request_defaults() {
        let req: RegisterRequest =
            serde_json::from_str(r#"{ "from": "0x0000000000000000000000000000000000000001" }"#).unwrap();
        assert!(req.uri.is_none());
        assert!(req.metadata.is_empty());
    }

    #[test]
    fn test_events_query_default_after() {
        let q: EventsQuery = serde_json::from_str(r#"{ "registry": "identity" }"#).unwrap();
        assert_eq!(q.after, 0);
    }
}
