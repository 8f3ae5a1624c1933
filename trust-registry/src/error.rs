//! Registry error taxonomy
//!
//! Every failure is synchronous and caller-correctable except `Storage`,
//! which stands in for a generic ledger failure.

use std::fmt;

use ethers::types::Address;

/// Coarse classification of a [`RegistryError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input: bad score, wrong blob length, unknown id, bad range
    Validation,
    /// Caller or signer is not allowed to do this
    Authorization,
    /// Record is not in the state the operation requires
    State,
    /// The backing store failed
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Authorization => write!(f, "authorization"),
            ErrorKind::State => write!(f, "state"),
            ErrorKind::Storage => write!(f, "storage"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    // ========== Validation ==========
    InvalidScore(u8),
    InvalidAuthLength { expected: usize, actual: usize },
    MalformedAuthorization(String),
    AgentNotFound(u64),
    FeedbackNotFound { agent_id: u64, index: u64 },
    InvalidRange { start: u64, end: u64, count: u64 },
    RequestNotFound(u64),
    ZeroAddress,

    // ========== Authorization ==========
    Unauthorized { caller: Address, agent_id: u64 },
    AgentIdMismatch,
    ClientMismatch,
    AuthExpired { expiry: String, now: u64 },
    NetworkMismatch,
    RegistryMismatch,
    UsageLimitExhausted { used: u64, limit: u64 },
    InvalidSignature(String),
    SignerNotAuthorized { signer: Address, agent_id: u64 },
    NotRequester { caller: Address, request_id: u64 },

    // ========== State ==========
    RequestNotPending { request_id: u64, status: String },
    NoResponseYet(u64),

    // ========== Storage ==========
    Storage(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        use RegistryError::*;
        match self {
            InvalidScore(_)
            | InvalidAuthLength { .. }
            | MalformedAuthorization(_)
            | AgentNotFound(_)
            | FeedbackNotFound { .. }
            | InvalidRange { .. }
            | RequestNotFound(_)
            | ZeroAddress => ErrorKind::Validation,
            Unauthorized { .. }
            | AgentIdMismatch
            | ClientMismatch
            | AuthExpired { .. }
            | NetworkMismatch
            | RegistryMismatch
            | UsageLimitExhausted { .. }
            | InvalidSignature(_)
            | SignerNotAuthorized { .. }
            | NotRequester { .. } => ErrorKind::Authorization,
            RequestNotPending { .. } | NoResponseYet(_) => ErrorKind::State,
            Storage(_) => ErrorKind::Storage,
        }
    }

    /// True for "no such record" failures (unknown agent, feedback or request)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::AgentNotFound(_)
                | RegistryError::FeedbackNotFound { .. }
                | RegistryError::RequestNotFound(_)
        )
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use RegistryError::*;
        match self {
            InvalidScore(score) => write!(f, "Score must be 0-100, got {}", score),
            InvalidAuthLength { expected, actual } => write!(
                f,
                "Authorization must be exactly {} bytes, got {}",
                expected, actual
            ),
            MalformedAuthorization(reason) => write!(f, "Malformed authorization: {}", reason),
            AgentNotFound(id) => write!(f, "Agent {} not found", id),
            FeedbackNotFound { agent_id, index } => {
                write!(f, "Feedback #{} not found for agent {}", index, agent_id)
            }
            InvalidRange { start, end, count } => write!(
                f,
                "Invalid feedback range {}..={} (count {})",
                start, end, count
            ),
            RequestNotFound(id) => write!(f, "Validation request {} not found", id),
            ZeroAddress => write!(f, "Zero address not allowed"),
            Unauthorized { caller, agent_id } => {
                write!(f, "Unauthorized: {:?} cannot act for agent {}", caller, agent_id)
            }
            AgentIdMismatch => write!(f, "Authorization agent id mismatch"),
            ClientMismatch => write!(f, "Authorization client mismatch"),
            AuthExpired { expiry, now } => {
                write!(f, "Authorization expired (expiry {}, now {})", expiry, now)
            }
            NetworkMismatch => write!(f, "Authorization network id mismatch"),
            RegistryMismatch => write!(f, "Authorization registry address mismatch"),
            UsageLimitExhausted { used, limit } => {
                write!(f, "Authorization usage limit exhausted ({}/{})", used, limit)
            }
            InvalidSignature(reason) => write!(f, "Invalid signature: {}", reason),
            SignerNotAuthorized { signer, agent_id } => write!(
                f,
                "Signer {:?} is not owner, delegate or operator of agent {}",
                signer, agent_id
            ),
            NotRequester { caller, request_id } => write!(
                f,
                "{:?} is not the requester of validation request {}",
                caller, request_id
            ),
            RequestNotPending { request_id, status } => write!(
                f,
                "Validation request {} is {}, not pending",
                request_id, status
            ),
            NoResponseYet(id) => write!(f, "Validation request {} has no response yet", id),
            Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<rusqlite::Error> for RegistryError {
    fn from(e: rusqlite::Error) -> Self {
        RegistryError::Storage(e.to_string())
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(RegistryError::InvalidScore(101).kind(), ErrorKind::Validation);
        assert_eq!(RegistryError::AgentIdMismatch.kind(), ErrorKind::Authorization);
        assert_eq!(
            RegistryError::UsageLimitExhausted { used: 3, limit: 3 }.kind(),
            ErrorKind::Authorization
        );
        assert_eq!(RegistryError::NoResponseYet(1).kind(), ErrorKind::State);
        assert_eq!(RegistryError::Storage("disk".into()).kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_display_carries_reason() {
        let err = RegistryError::InvalidAuthLength { expected: 289, actual: 10 };
        assert_eq!(err.to_string(), "Authorization must be exactly 289 bytes, got 10");
        assert!(RegistryError::AgentNotFound(7).is_not_found());
        assert!(!RegistryError::ClientMismatch.is_not_found());
    }
}
