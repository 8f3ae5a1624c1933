//! Agent trust registry
//!
//! Three cooperating registries over an ordered, shared ledger:
//!
//! - [`identity::IdentityRegistry`]: agent records, delegates, operators, metadata
//! - [`reputation::ReputationRegistry`]: feedback redeemed with a signed [`feedback_auth::FeedbackAuth`]
//! - [`validation::ValidationRegistry`]: request/response validation workflow
//!
//! [`ledger::Ledger`] wires them together and serializes every operation.

pub mod abi;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod events;
pub mod feedback_auth;
pub mod identity;
pub mod ledger;
pub mod reputation;
pub mod signature;
pub mod store;
pub mod types;
pub mod validation;


pub use config::RegistryConfig;
pub use context::{CallContext, Clock, ManualClock, SystemClock};
pub use error::{ErrorKind, RegistryError, RegistryResult};
pub use feedback_auth::{FeedbackAuth, FeedbackAuthSigner};
pub use ledger::{Ledger, LedgerStores, Registry};
pub use reputation::FeedbackSubmission;
pub use signature::{ContractSigners, ProgrammableSigner, SignerDirectory, SignerKind};
