//! Validation Registry: request/response workflow between a requester and an agent
//!
//! `Pending -> Responded` or `Pending -> Cancelled`; both are terminal.

use std::sync::Arc;

use ethers::types::{Address, H256};
use parking_lot::Mutex;

use crate::context::CallContext;
use crate::error::{RegistryError, RegistryResult};
use crate::events::{EventRecord, RegistryEvent};
use crate::identity::IdentityLookup;
use crate::store::{ValidationStore, ValidationWrite, WriteBatch};
use crate::types::{ValidationRecord, ValidationRequest, ValidationResponse, ValidationStatus};

pub struct ValidationRegistry {
    address: Address,
    identity: Arc<dyn IdentityLookup>,
    store: Mutex<Box<dyn ValidationStore>>,
}

impl ValidationRegistry {
    pub fn new(address: Address, identity: Arc<dyn IdentityLookup>, store: Box<dyn ValidationStore>) -> Self {
        Self {
            address,
            identity,
            store: Mutex::new(store),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Ask `agent_id` to validate something. Anyone may ask; the caller
    /// becomes the request's client.
    pub fn request_validation(
        &self,
        ctx: &CallContext,
        agent_id: u64,
        request_uri: &str,
        request_hash: H256,
    ) -> RegistryResult<u64> {
        self.identity.owner_of(agent_id)?;

        let mut store = self.store.lock();
        let request_id = store.request_count()? + 1;
        let request = ValidationRequest {
            request_id,
            agent_id,
            client: ctx.caller,
            request_uri: request_uri.to_string(),
            request_hash,
            timestamp: ctx.timestamp,
            status: ValidationStatus::Pending,
        };

        let mut batch = WriteBatch::new();
        batch
            .write(ValidationWrite::InsertRequest(request))
            .emit(RegistryEvent::ValidationRequested {
                request_id,
                agent_id,
                client: ctx.caller,
                request_uri: request_uri.to_string(),
                request_hash,
            });
        store.commit(batch)?;

        log::info!(
            "[VALIDATION] Request {} for agent {} opened by {:?}",
            request_id,
            agent_id,
            ctx.caller
        );
        Ok(request_id)
    }

    /// Answer a pending request; caller must be authorized for its agent
    pub fn respond_to_validation(
        &self,
        ctx: &CallContext,
        request_id: u64,
        response_uri: &str,
        response_hash: H256,
        is_valid: bool,
    ) -> RegistryResult<()> {
        let mut store = self.store.lock();
        let mut record = load_record(store.as_ref(), request_id)?;
        require_pending(&record)?;

        let agent_id = record.request.agent_id;
        if !self.identity.is_authorized(ctx.caller, agent_id)? {
            return Err(RegistryError::Unauthorized {
                caller: ctx.caller,
                agent_id,
            });
        }

        record.request.status = ValidationStatus::Responded;
        record.response = Some(ValidationResponse {
            response_uri: response_uri.to_string(),
            response_hash,
            timestamp: ctx.timestamp,
            is_valid,
        });
        let mut batch = WriteBatch::new();
        batch
            .write(ValidationWrite::UpdateRecord(record))
            .emit(RegistryEvent::ValidationResponded {
                request_id,
                agent_id,
                responder: ctx.caller,
                response_uri: response_uri.to_string(),
                response_hash,
                is_valid,
            });
        store.commit(batch)?;

        log::info!(
            "[VALIDATION] Request {} answered by {:?} (valid: {})",
            request_id,
            ctx.caller,
            is_valid
        );
        Ok(())
    }

    /// Withdraw a pending request; only its client may do this
    pub fn cancel_validation(&self, ctx: &CallContext, request_id: u64) -> RegistryResult<()> {
        let mut store = self.store.lock();
        let mut record = load_record(store.as_ref(), request_id)?;
        if record.request.client != ctx.caller {
            return Err(RegistryError::NotRequester {
                caller: ctx.caller,
                request_id,
            });
        }
        require_pending(&record)?;

        record.request.status = ValidationStatus::Cancelled;
        let agent_id = record.request.agent_id;
        let mut batch = WriteBatch::new();
        batch
            .write(ValidationWrite::UpdateRecord(record))
            .emit(RegistryEvent::ValidationCancelled {
                request_id,
                agent_id,
                client: ctx.caller,
            });
        store.commit(batch)?;

        log::info!("[VALIDATION] Request {} cancelled", request_id);
        Ok(())
    }

    // ============================================
    // Reads
    // ============================================

    pub fn get_request(&self, request_id: u64) -> RegistryResult<ValidationRequest> {
        Ok(load_record(self.store.lock().as_ref(), request_id)?.request)
    }

    /// Fails with `NoResponseYet` unless the request was answered
    pub fn get_response(&self, request_id: u64) -> RegistryResult<ValidationResponse> {
        let record = load_record(self.store.lock().as_ref(), request_id)?;
        match (record.request.status, record.response) {
            (ValidationStatus::Responded, Some(response)) => Ok(response),
            _ => Err(RegistryError::NoResponseYet(request_id)),
        }
    }

    pub fn get_record(&self, request_id: u64) -> RegistryResult<ValidationRecord> {
        load_record(self.store.lock().as_ref(), request_id)
    }

    pub fn get_agent_requests(&self, agent_id: u64) -> RegistryResult<Vec<u64>> {
        self.store.lock().agent_requests(agent_id)
    }

    pub fn get_client_requests(&self, client: Address) -> RegistryResult<Vec<u64>> {
        self.store.lock().client_requests(client)
    }

    pub fn get_pending_request_count(&self, agent_id: u64) -> RegistryResult<u64> {
        let store = self.store.lock();
        let mut pending = 0;
        for request_id in store.agent_requests(agent_id)? {
            if load_record(store.as_ref(), request_id)?.request.status == ValidationStatus::Pending {
                pending += 1;
            }
        }
        Ok(pending)
    }

    pub fn total_requests(&self) -> RegistryResult<u64> {
        self.store.lock().request_count()
    }

    pub fn events_since(&self, after: u64) -> RegistryResult<Vec<EventRecord>> {
        self.store.lock().events_since(after)
    }
}

fn load_record(store: &dyn ValidationStore, request_id: u64) -> RegistryResult<ValidationRecord> {
    store
        .record(request_id)?
        .ok_or(RegistryError::RequestNotFound(request_id))
}

fn require_pending(record: &ValidationRecord) -> RegistryResult<()> {
    if record.request.status != ValidationStatus::Pending {
        return Err(RegistryError::RequestNotPending {
            request_id: record.request.request_id,
            status: record.request.status.to_string(),
        });
    }
    Ok(())
}
