// src/transactions/reputation.rs
//! Endorsements between identities.

use crate::blockchain::chain_api::{pallets, CallArg, ChainCall};
use crate::blockchain::TransactionSubmitter;
use crate::models::reputation::EndorsementType;
use crate::models::transaction::{StatusCallback, TransactionResult};
use crate::transactions::{invalid_input, ss58};

/// Signed calls into the Reputation pallet.
#[derive(Clone)]
pub struct ReputationTransactions {
    submitter: TransactionSubmitter,
}

impl ReputationTransactions {
    pub fn new(submitter: TransactionSubmitter) -> Self {
        ReputationTransactions { submitter }
    }

    /// Endorses `endorsee` on behalf of `endorser`.
    ///
    /// # Arguments
    /// * `endorser` - Signing account; must hold an identity
    /// * `endorsee` - SS58 address being endorsed; must hold an identity
    /// * `endorsement_type` - Area of the endorsement
    /// * `comment` - Free text stored with the endorsement
    /// * `weight` - Strength from 1 to 10; the chain refuses other values
    /// * `on_status` - Optional progress callback
    pub async fn endorse(
        &self,
        endorser: &str,
        endorsee: &str,
        endorsement_type: EndorsementType,
        comment: &str,
        weight: u8,
        on_status: Option<StatusCallback>,
    ) -> TransactionResult {
        let endorsee = match ss58(endorsee, "endorsee") {
            Ok(endorsee) => endorsee,
            Err(message) => return invalid_input(message, on_status),
        };
        let call = ChainCall::new(
            pallets::REPUTATION,
            "endorse",
            vec![
                CallArg::account(&endorsee),
                CallArg::variant(endorsement_type.variant_name()),
                CallArg::bytes(comment.as_bytes()),
                CallArg::U8(weight),
            ],
        );
        self.submitter.submit(endorser, call, on_status).await
    }

    /// Withdraws the endorsement `endorser` previously gave `endorsee`.
    pub async fn remove_endorsement(
        &self,
        endorser: &str,
        endorsee: &str,
        on_status: Option<StatusCallback>,
    ) -> TransactionResult {
        let endorsee = match ss58(endorsee, "endorsee") {
            Ok(endorsee) => endorsee,
            Err(message) => return invalid_input(message, on_status),
        };
        let call = ChainCall::new(
            pallets::REPUTATION,
            "remove_endorsement",
            vec![CallArg::account(&endorsee)],
        );
        self.submitter.submit(endorser, call, on_status).await
    }
}
