// src/transactions/credential.rs
//! Credential issuance, revocation and verification.

use crate::blockchain::chain_api::{pallets, CallArg, ChainCall};
use crate::blockchain::TransactionSubmitter;
use crate::models::credential::CredentialType;
use crate::models::transaction::{StatusCallback, TransactionResult};
use crate::transactions::{bytes32, invalid_input, ss58};

/// Signed calls into the Credential pallet.
#[derive(Clone)]
pub struct CredentialTransactions {
    submitter: TransactionSubmitter,
}

impl CredentialTransactions {
    pub fn new(submitter: TransactionSubmitter) -> Self {
        CredentialTransactions { submitter }
    }

    /// Issues a credential from `issuer` to `holder`.
    ///
    /// The issuer must be a verified institution and both parties need an
    /// identity document; the chain enforces this.
    ///
    /// # Arguments
    /// * `issuer` - Issuing institution; signs the call
    /// * `holder` - SS58 address of the recipient
    /// * `content_hash` - Blake2b-256 hash of the credential document
    /// * `credential_type` - Display name such as `Master's Degree`; unknown
    ///   names are issued as `Other`
    /// * `metadata` - Free-form metadata, usually a JSON object
    /// * `expires_at` - Optional expiry block number
    /// * `on_status` - Optional progress callback
    #[allow(clippy::too_many_arguments)]
    pub async fn issue_credential(
        &self,
        issuer: &str,
        holder: &str,
        content_hash: &str,
        credential_type: &str,
        metadata: &str,
        expires_at: Option<u64>,
        on_status: Option<StatusCallback>,
    ) -> TransactionResult {
        let holder = match ss58(holder, "holder") {
            Ok(holder) => holder,
            Err(message) => return invalid_input(message, on_status),
        };
        let hash = match bytes32(content_hash, "content hash") {
            Ok(hash) => hash,
            Err(message) => return invalid_input(message, on_status),
        };
        // Block numbers are 32-bit on chain
        let expiry = match expires_at.map(u32::try_from).transpose() {
            Ok(expiry) => expiry,
            Err(_) => {
                return invalid_input(format!("expiry block {:?} is out of range", expires_at), on_status)
            }
        };
        let kind = CredentialType::from_display(credential_type);

        let call = ChainCall::new(
            pallets::CREDENTIAL,
            "issue_credential",
            vec![
                CallArg::account(&holder),
                CallArg::bytes(hash),
                CallArg::variant(kind.variant_name()),
                CallArg::bytes(metadata.as_bytes()),
                CallArg::Optional(expiry.map(|block| Box::new(CallArg::U32(block)))),
            ],
        );
        self.submitter.submit(issuer, call, on_status).await
    }

    /// Revokes a credential. Only its issuer may do so, and only once.
    pub async fn revoke_credential(
        &self,
        issuer: &str,
        credential_id: &str,
        on_status: Option<StatusCallback>,
    ) -> TransactionResult {
        let id = match bytes32(credential_id, "credential id") {
            Ok(id) => id,
            Err(message) => return invalid_input(message, on_status),
        };
        let call = ChainCall::new(pallets::CREDENTIAL, "revoke_credential", vec![CallArg::bytes(id)]);
        self.submitter.submit(issuer, call, on_status).await
    }

    /// Records an on-chain verification of the credential with
    /// `content_hash`. Fails for revoked or expired credentials.
    pub async fn verify_credential(
        &self,
        verifier: &str,
        content_hash: &str,
        on_status: Option<StatusCallback>,
    ) -> TransactionResult {
        let hash = match bytes32(content_hash, "content hash") {
            Ok(hash) => hash,
            Err(message) => return invalid_input(message, on_status),
        };
        let call = ChainCall::new(pallets::CREDENTIAL, "verify_credential", vec![CallArg::bytes(hash)]);
        self.submitter.submit(verifier, call, on_status).await
    }

    /// Replaces the metadata of an active credential. Issuer only.
    pub async fn update_credential_metadata(
        &self,
        issuer: &str,
        credential_id: &str,
        metadata: &str,
        on_status: Option<StatusCallback>,
    ) -> TransactionResult {
        let id = match bytes32(credential_id, "credential id") {
            Ok(id) => id,
            Err(message) => return invalid_input(message, on_status),
        };
        let call = ChainCall::new(
            pallets::CREDENTIAL,
            "update_credential_metadata",
            vec![CallArg::bytes(id), CallArg::bytes(metadata.as_bytes())],
        );
        self.submitter.submit(issuer, call, on_status).await
    }
}
