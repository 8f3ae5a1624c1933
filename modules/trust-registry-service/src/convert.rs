//! Wire <-> ledger conversions and error-to-status mapping

use std::str::FromStr;

use axum::http::StatusCode;
use ethers::types::{Address, H256, U256};
use trust_registry::types::{tag, tag_label, AgentRecord, FeedbackEntry, ValidationRecord};
use trust_registry::{ErrorKind, RegistryError};
use trust_registry_types::*;

/// A failed RPC call: HTTP status plus the message returned to the client
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        let status = if e.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            match e.kind() {
                ErrorKind::Validation | ErrorKind::State => StatusCode::BAD_REQUEST,
                ErrorKind::Authorization => StatusCode::FORBIDDEN,
                ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

pub fn parse_address(field: &str, raw: &str) -> Result<Address, ApiError> {
    Address::from_str(raw.trim()).map_err(|e| ApiError::bad_request(format!("Invalid {}: {}", field, e)))
}

pub fn parse_hex(field: &str, raw: &str) -> Result<Vec<u8>, ApiError> {
    let raw = raw.trim();
    hex::decode(raw.strip_prefix("0x").unwrap_or(raw))
        .map_err(|e| ApiError::bad_request(format!("Invalid {} hex: {}", field, e)))
}

/// Exactly 32 bytes of hex; absent means zero
pub fn parse_h256(field: &str, raw: Option<&str>) -> Result<H256, ApiError> {
    match raw {
        None => Ok(H256::zero()),
        Some(raw) if raw.trim().is_empty() => Ok(H256::zero()),
        Some(raw) => {
            let bytes = parse_hex(field, raw)?;
            if bytes.len() != 32 {
                return Err(ApiError::bad_request(format!(
                    "Invalid {}: expected 32 bytes, got {}",
                    field,
                    bytes.len()
                )));
            }
            Ok(H256::from_slice(&bytes))
        }
    }
}

/// A 0x-prefixed 32-byte hex tag, or a short label padded into one
pub fn parse_tag(raw: &str) -> Result<H256, ApiError> {
    let raw = raw.trim();
    if raw.starts_with("0x") && raw.len() == 66 {
        parse_h256("tag", Some(raw))
    } else {
        Ok(tag(raw))
    }
}

pub fn parse_u256(field: &str, raw: &str) -> Result<U256, ApiError> {
    U256::from_dec_str(raw.trim()).map_err(|e| ApiError::bad_request(format!("Invalid {}: {}", field, e)))
}

pub fn hex_string(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn address_string(address: &Address) -> String {
    format!("{:?}", address)
}

pub fn agent_view(record: AgentRecord) -> AgentView {
    AgentView {
        agent_id: record.agent_id,
        owner: address_string(&record.owner),
        delegate: record.delegate.as_ref().map(address_string),
        uri: record.uri,
    }
}

pub fn feedback_view(entry: FeedbackEntry) -> FeedbackView {
    FeedbackView {
        agent_id: entry.agent_id,
        index: entry.index,
        client: address_string(&entry.client),
        score: entry.score,
        tag1: hex_string(entry.tag1.as_bytes()),
        tag2: hex_string(entry.tag2.as_bytes()),
        tag1_label: tag_label(&entry.tag1),
        tag2_label: tag_label(&entry.tag2),
        content_uri: entry.content_uri,
        content_hash: hex_string(entry.content_hash.as_bytes()),
        timestamp: entry.timestamp,
    }
}

pub fn validation_view(record: ValidationRecord) -> ValidationView {
    let ValidationRecord { request, response } = record;
    ValidationView {
        request_id: request.request_id,
        agent_id: request.agent_id,
        client: address_string(&request.client),
        request_uri: request.request_uri,
        request_hash: hex_string(request.request_hash.as_bytes()),
        timestamp: request.timestamp,
        status: request.status.to_string(),
        response: response.map(|r| ValidationResponseView {
            response_uri: r.response_uri,
            response_hash: hex_string(r.response_hash.as_bytes()),
            timestamp: r.timestamp,
            is_valid: r.is_valid,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let status = |e: RegistryError| ApiError::from(e).status;
        assert_eq!(status(RegistryError::AgentNotFound(1)), StatusCode::NOT_FOUND);
        assert_eq!(status(RegistryError::InvalidScore(101)), StatusCode::BAD_REQUEST);
        assert_eq!(status(RegistryError::NoResponseYet(1)), StatusCode::BAD_REQUEST);
        assert_eq!(status(RegistryError::ClientMismatch), StatusCode::FORBIDDEN);
        assert_eq!(
            status(RegistryError::Storage("disk".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!(parse_tag("quality").unwrap(), tag("quality"));
        let raw = format!("0x{}", "ab".repeat(32));
        assert_eq!(parse_tag(&raw).unwrap(), H256::repeat_byte(0xab));
        assert_eq!(parse_tag("").unwrap(), H256::zero());
    }

    #[test]
    fn test_parse_h256() {
        assert_eq!(parse_h256("hash", None).unwrap(), H256::zero());
        assert!(parse_h256("hash", Some("0x1234")).is_err());
        assert!(parse_h256("hash", Some("zz")).is_err());
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("from", "0x1234").is_err());
        assert_eq!(
            parse_address("from", "0x000000000000000000000000000000000000dEaD").unwrap(),
            Address::from_low_u64_be(0xdead)
        );
    }
}
