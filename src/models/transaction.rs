// src/models/transaction.rs
//! Transaction progress and outcome records.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{TransactionError, TransactionErrorKind};

/// Stage of one submitted operation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TxStage {
    Idle,
    Signing,
    Submitting,
    InBlock,
    Finalized,
    Error,
}

/// Progress update relayed to the caller while a transaction is in flight.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransactionStatus {
    pub status: TxStage,
    /// Human-readable description of the stage
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransactionStatus {
    pub fn new(status: TxStage, message: impl Into<String>) -> Self {
        TransactionStatus {
            status,
            message: message.into(),
            block_hash: None,
            error: None,
        }
    }

    pub fn with_block(mut self, block_hash: impl Into<String>) -> Self {
        self.block_hash = Some(block_hash.into());
        self
    }

    pub fn failed(error: impl Into<String>) -> Self {
        TransactionStatus {
            status: TxStage::Error,
            message: "Transaction failed".into(),
            block_hash: None,
            error: Some(error.into()),
        }
    }
}

/// Receives progress updates; invoked in stage order.
pub type StatusCallback = Arc<dyn Fn(TransactionStatus) + Send + Sync>;

/// Single pass/fail outcome of a transaction.
///
/// There is no partial success: either finality was reached cleanly or the
/// call is reported as failed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransactionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<TransactionErrorKind>,
}

impl TransactionResult {
    pub fn finalized(block_hash: String, transaction_hash: Option<String>) -> Self {
        TransactionResult {
            success: true,
            block_hash: Some(block_hash),
            transaction_hash,
            error: None,
            error_kind: None,
        }
    }

    pub fn failed(error: &TransactionError, transaction_hash: Option<String>) -> Self {
        TransactionResult {
            success: false,
            block_hash: None,
            transaction_hash,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}
