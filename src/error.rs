// src/error.rs
//! Error types shared across the blockchain, wallet and service layers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockchain::dispatch_error::DispatchFailure;

/// Faults at the node transport seam.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Connection failed: `{0}`")]
    Connection(String),
    #[error("Invalid account address: `{0}`")]
    InvalidAddress(String),
    #[error("Invalid argument: `{0}`")]
    InvalidArgument(String),
    #[error("Storage decoding failed: `{0}`")]
    Decoding(String),
    #[error("Transport error: `{0}`")]
    Transport(String),
    #[error("JSON parse error: `{0}`")]
    JsonParse(#[from] serde_json::Error),
}

impl From<subxt::Error> for ChainError {
    fn from(e: subxt::Error) -> Self {
        ChainError::Transport(e.to_string())
    }
}

/// Faults raised while obtaining a signature.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("Signing request rejected: `{0}`")]
    Rejected(String),
    #[error("Invalid secret URI: `{0}`")]
    InvalidSecret(String),
}

/// Short user-facing category of a failed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionErrorKind {
    InvalidInput,
    Rejected,
    InsufficientBalance,
    Module,
    Timeout,
    Dropped,
    Transport,
}

/// Typed classification of a failed submission.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransactionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Transaction rejected by signer: {0}")]
    Rejected(String),
    #[error("Insufficient balance to pay fees: {0}")]
    InsufficientBalance(String),
    #[error("{0}")]
    Dispatch(DispatchFailure),
    #[error("Transaction timed out after {0} seconds without finality")]
    Timeout(u64),
    #[error("Transaction dropped: {0}")]
    Dropped(String),
    #[error("{0}")]
    Transport(String),
}

impl TransactionError {
    /// Returns the category shown to users.
    pub fn kind(&self) -> TransactionErrorKind {
        match self {
            TransactionError::InvalidInput(_) => TransactionErrorKind::InvalidInput,
            TransactionError::Rejected(_) => TransactionErrorKind::Rejected,
            TransactionError::InsufficientBalance(_) => TransactionErrorKind::InsufficientBalance,
            TransactionError::Dispatch(_) => TransactionErrorKind::Module,
            TransactionError::Timeout(_) => TransactionErrorKind::Timeout,
            TransactionError::Dropped(_) => TransactionErrorKind::Dropped,
            TransactionError::Transport(_) => TransactionErrorKind::Transport,
        }
    }
}

/// Refused transitions in the local credential-request store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Credential request not found: `{0}`")]
    NotFound(String),
    #[error("Cannot move request from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Missing required field: `{0}`")]
    MissingField(String),
}

/// Form wizard validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WizardError {
    #[error("Step {step} is missing required fields: {fields:?}")]
    MissingFields { step: usize, fields: Vec<String> },
    #[error("Form is not on its final step")]
    NotComplete,
}
