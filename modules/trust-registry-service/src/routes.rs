//! Axum route handlers for the trust registry RPC API.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use trust_registry::types::MetadataEntry;
use trust_registry::{FeedbackSubmission, Ledger, Registry};
use trust_registry_types::*;

use crate::convert::{
    address_string, agent_view, feedback_view, hex_string, parse_address, parse_h256, parse_hex, parse_tag,
    parse_u256, validation_view, ApiError,
};

pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub start_time: Instant,
}

type RpcResult<T> = (StatusCode, Json<RpcResponse<T>>);

fn respond<T: Serialize>(result: Result<T, ApiError>) -> RpcResult<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(RpcResponse::ok(data))),
        Err(e) => (e.status, Json(RpcResponse::err(e.message))),
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Identity
        .route("/rpc/identity/register", post(register))
        .route("/rpc/identity/set_metadata", post(set_metadata))
        .route("/rpc/identity/set_uri", post(set_uri))
        .route("/rpc/identity/approve", post(approve))
        .route("/rpc/identity/set_approval_for_all", post(set_approval_for_all))
        .route("/rpc/identity/transfer", post(transfer))
        .route("/rpc/identity/agent", post(agent))
        .route("/rpc/identity/metadata", post(metadata))
        .route("/rpc/identity/metadata_batch", post(metadata_batch))
        .route("/rpc/identity/is_approved_for_all", post(is_approved_for_all))
        // Reputation
        .route("/rpc/reputation/give_feedback", post(give_feedback))
        .route("/rpc/reputation/feedback", post(feedback))
        .route("/rpc/reputation/feedback_batch", post(feedback_batch))
        .route("/rpc/reputation/feedback_by_client", post(feedback_by_client))
        .route("/rpc/reputation/average", post(average))
        .route("/rpc/reputation/count_by_tag", post(count_by_tag))
        .route("/rpc/reputation/auth_usage", post(auth_usage))
        // Validation
        .route("/rpc/validation/request", post(request_validation))
        .route("/rpc/validation/respond", post(respond_validation))
        .route("/rpc/validation/cancel", post(cancel_validation))
        .route("/rpc/validation/get", post(get_validation))
        .route("/rpc/validation/agent_requests", post(agent_requests))
        .route("/rpc/validation/client_requests", post(client_requests))
        .route("/rpc/validation/pending_count", post(pending_count))
        // Ledger
        .route("/rpc/events", get(events))
        .route("/rpc/status", get(status))
        .with_state(state)
}

// =====================================================
// Identity
// =====================================================

// POST /rpc/identity/register
pub async fn register(State(state): State<Arc<AppState>>, Json(req): Json<RegisterRequest>) -> RpcResult<u64> {
    respond((|| -> Result<_, ApiError> {
        let from = parse_address("from", &req.from)?;
        let metadata = req
            .metadata
            .iter()
            .map(|pair| -> Result<MetadataEntry, ApiError> {
                Ok(MetadataEntry::new(pair.key.clone(), parse_hex("metadata value", &pair.value)?))
            })
            .collect::<Result<Vec<_>, ApiError>>()?;
        let uri = req.uri.as_deref().unwrap_or("");
        Ok(state.ledger.register_with_metadata(from, uri, metadata)?)
    })())
}

// POST /rpc/identity/set_metadata
pub async fn set_metadata(State(state): State<Arc<AppState>>, Json(req): Json<SetMetadataRequest>) -> RpcResult<bool> {
    respond((|| -> Result<_, ApiError> {
        let from = parse_address("from", &req.from)?;
        let value = parse_hex("value", &req.value)?;
        state.ledger.set_metadata(from, req.agent_id, &req.key, value)?;
        Ok(true)
    })())
}

// POST /rpc/identity/set_uri
pub async fn set_uri(State(state): State<Arc<AppState>>, Json(req): Json<SetUriRequest>) -> RpcResult<bool> {
    respond((|| -> Result<_, ApiError> {
        let from = parse_address("from", &req.from)?;
        state.ledger.set_uri(from, req.agent_id, &req.uri)?;
        Ok(true)
    })())
}

// POST /rpc/identity/approve
pub async fn approve(State(state): State<Arc<AppState>>, Json(req): Json<ApproveRequest>) -> RpcResult<bool> {
    respond((|| -> Result<_, ApiError> {
        let from = parse_address("from", &req.from)?;
        let delegate = parse_address("delegate", &req.delegate)?;
        state.ledger.approve(from, req.agent_id, delegate)?;
        Ok(true)
    })())
}

// POST /rpc/identity/set_approval_for_all
pub async fn set_approval_for_all(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetApprovalForAllRequest>,
) -> RpcResult<bool> {
    respond((|| -> Result<_, ApiError> {
        let from = parse_address("from", &req.from)?;
        let operator = parse_address("operator", &req.operator)?;
        state.ledger.set_approval_for_all(from, operator, req.approved)?;
        Ok(true)
    })())
}

// POST /rpc/identity/transfer
pub async fn transfer(State(state): State<Arc<AppState>>, Json(req): Json<TransferRequest>) -> RpcResult<bool> {
    respond((|| -> Result<_, ApiError> {
        let from = parse_address("from", &req.from)?;
        let to = parse_address("to", &req.to)?;
        state.ledger.transfer_from(from, req.agent_id, to)?;
        Ok(true)
    })())
}

// POST /rpc/identity/agent
pub async fn agent(State(state): State<Arc<AppState>>, Json(req): Json<AgentRequest>) -> RpcResult<AgentView> {
    respond(state.ledger.agent(req.agent_id).map(agent_view).map_err(ApiError::from))
}

// POST /rpc/identity/metadata
pub async fn metadata(State(state): State<Arc<AppState>>, Json(req): Json<MetadataRequest>) -> RpcResult<String> {
    respond(
        state
            .ledger
            .get_metadata(req.agent_id, &req.key)
            .map(|v| hex_string(&v))
            .map_err(ApiError::from),
    )
}

// POST /rpc/identity/metadata_batch
pub async fn metadata_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MetadataBatchRequest>,
) -> RpcResult<Vec<String>> {
    respond(
        state
            .ledger
            .get_metadata_batch(req.agent_id, &req.keys)
            .map(|values| values.iter().map(|v| hex_string(v)).collect())
            .map_err(ApiError::from),
    )
}

// POST /rpc/identity/is_approved_for_all
pub async fn is_approved_for_all(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ApprovedForAllRequest>,
) -> RpcResult<bool> {
    respond((|| -> Result<_, ApiError> {
        let owner = parse_address("owner", &req.owner)?;
        let operator = parse_address("operator", &req.operator)?;
        Ok(state.ledger.is_approved_for_all(owner, operator)?)
    })())
}

// =====================================================
// Reputation
// =====================================================

// POST /rpc/reputation/give_feedback
pub async fn give_feedback(State(state): State<Arc<AppState>>, Json(req): Json<GiveFeedbackRequest>) -> RpcResult<u64> {
    respond((|| -> Result<_, ApiError> {
        let from = parse_address("from", &req.from)?;
        let submission = FeedbackSubmission {
            agent_id: req.agent_id,
            score: req.score,
            tag1: parse_tag(&req.tag1)?,
            tag2: parse_tag(&req.tag2)?,
            content_uri: req.content_uri.clone(),
            content_hash: parse_h256("content_hash", req.content_hash.as_deref())?,
            auth: parse_hex("feedback_auth", &req.feedback_auth)?,
        };
        Ok(state.ledger.give_feedback(from, submission)?)
    })())
}

// POST /rpc/reputation/feedback
pub async fn feedback(State(state): State<Arc<AppState>>, Json(req): Json<FeedbackRequest>) -> RpcResult<FeedbackView> {
    respond(
        state
            .ledger
            .get_feedback(req.agent_id, req.index)
            .map(feedback_view)
            .map_err(ApiError::from),
    )
}

// POST /rpc/reputation/feedback_batch
pub async fn feedback_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FeedbackBatchRequest>,
) -> RpcResult<Vec<FeedbackView>> {
    respond(
        state
            .ledger
            .get_feedback_batch(req.agent_id, req.start, req.end)
            .map(|entries| entries.into_iter().map(feedback_view).collect())
            .map_err(ApiError::from),
    )
}

// POST /rpc/reputation/feedback_by_client
pub async fn feedback_by_client(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FeedbackByClientRequest>,
) -> RpcResult<Vec<FeedbackView>> {
    respond((|| -> Result<_, ApiError> {
        let client = parse_address("client", &req.client)?;
        let entries = state.ledger.get_feedback_by_client(req.agent_id, client)?;
        Ok(entries.into_iter().map(feedback_view).collect())
    })())
}

// POST /rpc/reputation/average
pub async fn average(State(state): State<Arc<AppState>>, Json(req): Json<AgentRequest>) -> RpcResult<AverageScore> {
    respond(
        state
            .ledger
            .get_average_score(req.agent_id)
            .map(|(average_x100, count)| AverageScore { average_x100, count })
            .map_err(ApiError::from),
    )
}

// POST /rpc/reputation/count_by_tag
pub async fn count_by_tag(State(state): State<Arc<AppState>>, Json(req): Json<CountByTagRequest>) -> RpcResult<u64> {
    respond((|| -> Result<_, ApiError> {
        let tag = parse_tag(&req.tag)?;
        Ok(state.ledger.get_feedback_count_by_tag(req.agent_id, tag)?)
    })())
}

// POST /rpc/reputation/auth_usage
pub async fn auth_usage(State(state): State<Arc<AppState>>, Json(req): Json<AuthUsageRequest>) -> RpcResult<u64> {
    respond((|| -> Result<_, ApiError> {
        let agent_id = parse_u256("agent_id", &req.agent_id)?;
        let client = parse_address("client", &req.client)?;
        let expiry = parse_u256("expiry", &req.expiry)?;
        Ok(state.ledger.get_auth_usage(agent_id, client, req.index_limit, expiry)?)
    })())
}

// =====================================================
// Validation
// =====================================================

// POST /rpc/validation/request
pub async fn request_validation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RequestValidationRequest>,
) -> RpcResult<u64> {
    respond((|| -> Result<_, ApiError> {
        let from = parse_address("from", &req.from)?;
        let hash = parse_h256("request_hash", Some(req.request_hash.as_str()))?;
        Ok(state
            .ledger
            .request_validation(from, req.agent_id, &req.request_uri, hash)?)
    })())
}

// POST /rpc/validation/respond
pub async fn respond_validation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RespondValidationRequest>,
) -> RpcResult<bool> {
    respond((|| -> Result<_, ApiError> {
        let from = parse_address("from", &req.from)?;
        let hash = parse_h256("response_hash", Some(req.response_hash.as_str()))?;
        state
            .ledger
            .respond_to_validation(from, req.request_id, &req.response_uri, hash, req.is_valid)?;
        Ok(true)
    })())
}

// POST /rpc/validation/cancel
pub async fn cancel_validation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CancelValidationRequest>,
) -> RpcResult<bool> {
    respond((|| -> Result<_, ApiError> {
        let from = parse_address("from", &req.from)?;
        state.ledger.cancel_validation(from, req.request_id)?;
        Ok(true)
    })())
}

// POST /rpc/validation/get
pub async fn get_validation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidationIdRequest>,
) -> RpcResult<ValidationView> {
    respond(
        state
            .ledger
            .get_validation(req.request_id)
            .map(validation_view)
            .map_err(ApiError::from),
    )
}

// POST /rpc/validation/agent_requests
pub async fn agent_requests(State(state): State<Arc<AppState>>, Json(req): Json<AgentRequest>) -> RpcResult<Vec<u64>> {
    respond(state.ledger.get_agent_requests(req.agent_id).map_err(ApiError::from))
}

// POST /rpc/validation/client_requests
pub async fn client_requests(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClientRequestsRequest>,
) -> RpcResult<Vec<u64>> {
    respond((|| -> Result<_, ApiError> {
        let client = parse_address("client", &req.client)?;
        Ok(state.ledger.get_client_requests(client)?)
    })())
}

// POST /rpc/validation/pending_count
pub async fn pending_count(State(state): State<Arc<AppState>>, Json(req): Json<AgentRequest>) -> RpcResult<u64> {
    respond(state.ledger.get_pending_request_count(req.agent_id).map_err(ApiError::from))
}

// =====================================================
// Ledger
// =====================================================

// GET /rpc/events?registry=identity&after=0
pub async fn events(State(state): State<Arc<AppState>>, Query(query): Query<EventsQuery>) -> RpcResult<Vec<EventView>> {
    respond((|| -> Result<Vec<EventView>, ApiError> {
        let registry: Registry = query.registry.parse().map_err(ApiError::bad_request)?;
        let records = state.ledger.events_since(registry, query.after)?;
        records
            .into_iter()
            .map(|record| {
                let payload = serde_json::to_value(&record.event)
                    .map_err(|e| ApiError::bad_request(format!("Event encoding failed: {}", e)))?;
                Ok(EventView {
                    seq: record.seq,
                    name: record.event.name().to_string(),
                    payload,
                })
            })
            .collect()
    })())
}

// GET /rpc/status
pub async fn status(State(state): State<Arc<AppState>>) -> RpcResult<ServiceStatus> {
    let ledger = &state.ledger;
    let now = ledger.now();
    let ledger_time = chrono::DateTime::from_timestamp(now as i64, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    (
        StatusCode::OK,
        Json(RpcResponse::ok(ServiceStatus {
            running: true,
            uptime_secs: state.start_time.elapsed().as_secs(),
            network_id: ledger.network_id().to_string(),
            identity_address: address_string(&ledger.identity_address()),
            reputation_address: address_string(&ledger.reputation_address()),
            validation_address: address_string(&ledger.validation_address()),
            total_agents: ledger.total_agents().unwrap_or(0),
            total_requests: ledger.total_requests().unwrap_or(0),
            ledger_time,
        })),
    )
}
