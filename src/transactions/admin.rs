// src/transactions/admin.rs
//! Privileged institution management, dispatched through `Sudo.sudo`.

use crate::blockchain::chain_api::{pallets, CallArg, ChainCall};
use crate::blockchain::TransactionSubmitter;
use crate::models::transaction::{StatusCallback, TransactionResult};
use crate::transactions::{invalid_input, ss58};

#[derive(Clone)]
pub struct AdminTransactions {
    submitter: TransactionSubmitter,
}

impl AdminTransactions {
    pub fn new(submitter: TransactionSubmitter) -> Self {
        AdminTransactions { submitter }
    }

    /// Marks `institution` as verified so it may issue credentials.
    ///
    /// `admin` must be the chain's sudo key. A failure of the wrapped call is
    /// reported as a failure of the whole transaction.
    pub async fn verify_institution(
        &self,
        admin: &str,
        institution: &str,
        on_status: Option<StatusCallback>,
    ) -> TransactionResult {
        self.sudo(admin, "verify_institution", institution, on_status).await
    }

    /// Withdraws verification from `institution`.
    pub async fn revoke_institution(
        &self,
        admin: &str,
        institution: &str,
        on_status: Option<StatusCallback>,
    ) -> TransactionResult {
        self.sudo(admin, "revoke_institution", institution, on_status).await
    }

    async fn sudo(
        &self,
        admin: &str,
        call: &'static str,
        institution: &str,
        on_status: Option<StatusCallback>,
    ) -> TransactionResult {
        let institution = match ss58(institution, "institution") {
            Ok(institution) => institution,
            Err(message) => return invalid_input(message, on_status),
        };
        let inner = ChainCall::new(pallets::DID, call, vec![CallArg::account(&institution)]);
        self.submitter
            .submit(admin, ChainCall::sudo(inner), on_status)
            .await
    }
}
