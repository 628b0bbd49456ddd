// src/transactions/mod.rs
//! Transaction layer.
//!
//! One service per pallet. Each operation builds its call, hands it to the
//! [`TransactionSubmitter`] under the caller's account and returns a single
//! [`TransactionResult`]. Parameters are expected to be validated by the
//! caller; the only checks here are the ones needed to encode the call.
//! Nothing is cached: callers refresh queries after a successful result.

pub mod admin;
pub mod credential;
pub mod did;
pub mod reputation;

use log::warn;

use crate::blockchain::TransactionSubmitter;
use crate::error::TransactionError;
use crate::models::transaction::{StatusCallback, TransactionResult, TransactionStatus};
use crate::utils::crypto::parse_hash;
use crate::wallet::key_management::normalize;

pub use admin::AdminTransactions;
pub use credential::CredentialTransactions;
pub use did::DidTransactions;
pub use reputation::ReputationTransactions;

/// Entry point to the transaction layer.
#[derive(Clone)]
pub struct BlockchainTransactions {
    pub did: DidTransactions,
    pub credential: CredentialTransactions,
    pub reputation: ReputationTransactions,
    pub admin: AdminTransactions,
}

impl BlockchainTransactions {
    pub fn new(submitter: TransactionSubmitter) -> Self {
        BlockchainTransactions {
            did: DidTransactions::new(submitter.clone()),
            credential: CredentialTransactions::new(submitter.clone()),
            reputation: ReputationTransactions::new(submitter.clone()),
            admin: AdminTransactions::new(submitter),
        }
    }
}

/// Fails an operation whose parameters cannot be encoded, without signing.
pub(crate) fn invalid_input(message: String, on_status: Option<StatusCallback>) -> TransactionResult {
    let error = TransactionError::InvalidInput(message);
    warn!("Not submitting: {}", error);
    if let Some(callback) = on_status {
        callback(TransactionStatus::failed(error.to_string()));
    }
    TransactionResult::failed(&error, None)
}

/// Decodes a `0x` hex value that must be exactly 32 bytes.
pub(crate) fn bytes32(value: &str, what: &str) -> Result<[u8; 32], String> {
    parse_hash(value).ok_or_else(|| format!("{} must be 32 bytes of hex, got `{}`", what, value))
}

/// Normalizes an account parameter that must be an SS58 address.
pub(crate) fn ss58(value: &str, what: &str) -> Result<String, String> {
    normalize(value).ok_or_else(|| format!("{} must be an SS58 address, got `{}`", what, value))
}
