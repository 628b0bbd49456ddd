// src/transactions/did.rs
//! Identity and institution registration.

use crate::blockchain::chain_api::{pallets, CallArg, ChainCall};
use crate::blockchain::TransactionSubmitter;
use crate::models::did::KeyType;
use crate::models::transaction::{StatusCallback, TransactionResult};
use crate::transactions::{bytes32, invalid_input};

/// Signed calls into the DID pallet.
#[derive(Clone)]
pub struct DidTransactions {
    submitter: TransactionSubmitter,
}

impl DidTransactions {
    pub fn new(submitter: TransactionSubmitter) -> Self {
        DidTransactions { submitter }
    }

    /// Creates the identity document for `account`.
    ///
    /// # Arguments
    /// * `account` - Controller of the new identity; signs the call
    /// * `public_key` - Initial 32-byte public key as `0x` hex
    /// * `key_type` - Signature scheme of the key
    /// * `on_status` - Optional progress callback
    pub async fn create_did(
        &self,
        account: &str,
        public_key: &str,
        key_type: KeyType,
        on_status: Option<StatusCallback>,
    ) -> TransactionResult {
        let key = match bytes32(public_key, "public key") {
            Ok(key) => key,
            Err(message) => return invalid_input(message, on_status),
        };
        let call = ChainCall::new(
            pallets::DID,
            "create_did",
            vec![CallArg::bytes(key), CallArg::variant(key_type.variant_name())],
        );
        self.submitter.submit(account, call, on_status).await
    }

    /// Registers `account` as an institution. Verification is a separate,
    /// privileged step.
    pub async fn register_institution(
        &self,
        account: &str,
        name: &str,
        on_status: Option<StatusCallback>,
    ) -> TransactionResult {
        let call = ChainCall::new(
            pallets::DID,
            "register_institution",
            vec![CallArg::bytes(name.trim().as_bytes())],
        );
        self.submitter.submit(account, call, on_status).await
    }

    /// Adds another public key to the caller's identity document.
    pub async fn add_public_key(
        &self,
        account: &str,
        public_key: &str,
        key_type: KeyType,
        on_status: Option<StatusCallback>,
    ) -> TransactionResult {
        let key = match bytes32(public_key, "public key") {
            Ok(key) => key,
            Err(message) => return invalid_input(message, on_status),
        };
        let call = ChainCall::new(
            pallets::DID,
            "add_public_key",
            vec![CallArg::bytes(key), CallArg::variant(key_type.variant_name())],
        );
        self.submitter.submit(account, call, on_status).await
    }
}
