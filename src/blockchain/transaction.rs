// src/blockchain/transaction.rs
//! Transaction submission workflow.
//!
//! Drives one call from signing to finality:
//!
//! ```text
//! idle -> signing -> submitting -> inBlock -> finalized
//!            \            \            \
//!             +------------+------------+--> error
//! ```
//!
//! Progress is relayed to an optional callback in that order. Failure events
//! are only inspected once the block is final, so a call that lands in a block
//! can still resolve as failed.

use futures::StreamExt;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::blockchain::chain_api::{ChainApi, ChainCall, TxEvent};
use crate::blockchain::dispatch_error::{classify_chain_error, classify_message};
use crate::error::{TransactionError, TransactionErrorKind};
use crate::models::transaction::{StatusCallback, TransactionResult, TransactionStatus, TxStage};
use crate::wallet::key_management::ExternalSigner;

/// Submits calls on behalf of accounts held by an external signer.
#[derive(Clone)]
pub struct TransactionSubmitter {
    chain: Arc<dyn ChainApi>,
    signer: Arc<dyn ExternalSigner>,
    /// Upper bound on the whole flow, signing included
    timeout: Duration,
}

/// Relays stage changes and remembers the extrinsic hash once known.
struct Progress {
    callback: Option<StatusCallback>,
    extrinsic_hash: Mutex<Option<String>>,
}

impl Progress {
    fn new(callback: Option<StatusCallback>) -> Self {
        Progress {
            callback,
            extrinsic_hash: Mutex::new(None),
        }
    }

    fn emit(&self, status: TransactionStatus) {
        debug!("Transaction stage {:?}: {}", status.status, status.message);
        if let Some(callback) = &self.callback {
            callback(status);
        }
    }

    fn set_hash(&self, hash: &str) {
        if let Ok(mut slot) = self.extrinsic_hash.lock() {
            *slot = Some(hash.to_string());
        }
    }

    fn hash(&self) -> Option<String> {
        self.extrinsic_hash.lock().ok().and_then(|slot| slot.clone())
    }
}

impl TransactionSubmitter {
    /// Creates a submitter.
    ///
    /// # Arguments
    /// * `chain` - Node transport
    /// * `signer` - Source of signing keys for caller accounts
    /// * `timeout` - Bound on a single submission, from signing to finality
    pub fn new(chain: Arc<dyn ChainApi>, signer: Arc<dyn ExternalSigner>, timeout: Duration) -> Self {
        Self {
            chain,
            signer,
            timeout,
        }
    }

    /// Signs `call` as `account`, submits it and waits for finality.
    ///
    /// Never fails: every outcome is folded into the returned
    /// [`TransactionResult`]. A timeout only stops waiting; the extrinsic may
    /// still be included afterwards.
    ///
    /// # Arguments
    /// * `account` - SS58 address of the signing account
    /// * `call` - Call to dispatch
    /// * `on_status` - Optional progress callback
    pub async fn submit(
        &self,
        account: &str,
        call: ChainCall,
        on_status: Option<StatusCallback>,
    ) -> TransactionResult {
        let label = call.label();
        let progress = Progress::new(on_status);

        let outcome = tokio::time::timeout(self.timeout, self.drive(account, call, &progress)).await;
        let error = match outcome {
            Ok(Ok(block_hash)) => {
                info!("{} from {} finalized in block {}", label, account, block_hash);
                return TransactionResult::finalized(block_hash, progress.hash());
            }
            Ok(Err(error)) => error,
            Err(_) => TransactionError::Timeout(self.timeout.as_secs()),
        };

        match error.kind() {
            TransactionErrorKind::Rejected | TransactionErrorKind::Module => {
                info!("{} from {} failed: {}", label, account, error)
            }
            _ => warn!("{} from {} failed: {}", label, account, error),
        }
        progress.emit(TransactionStatus::failed(error.to_string()));
        TransactionResult::failed(&error, progress.hash())
    }

    async fn drive(
        &self,
        account: &str,
        call: ChainCall,
        progress: &Progress,
    ) -> Result<String, TransactionError> {
        progress.emit(TransactionStatus::new(TxStage::Signing, "Waiting for signature..."));
        let keypair = self
            .signer
            .signer_for(account)
            .await
            .map_err(|e| TransactionError::Rejected(e.to_string()))?;

        progress.emit(TransactionStatus::new(TxStage::Submitting, "Submitting transaction..."));
        let submission = self
            .chain
            .submit_and_watch(call, keypair)
            .await
            .map_err(classify_chain_error)?;
        progress.set_hash(&submission.extrinsic_hash);

        let mut events = submission.events;
        while let Some(event) = events.next().await {
            match event.map_err(classify_chain_error)? {
                TxEvent::Ready => {}
                TxEvent::InBlock { block_hash } => {
                    progress.emit(
                        TransactionStatus::new(TxStage::InBlock, "Transaction included in block")
                            .with_block(block_hash),
                    );
                }
                TxEvent::Finalized {
                    failure: Some(failure),
                    ..
                } => return Err(TransactionError::Dispatch(failure)),
                TxEvent::Finalized {
                    block_hash,
                    failure: None,
                } => {
                    progress.emit(
                        TransactionStatus::new(TxStage::Finalized, "Transaction finalized")
                            .with_block(block_hash.clone()),
                    );
                    return Ok(block_hash);
                }
                TxEvent::Dropped { message } => {
                    return Err(match classify_message(&message) {
                        TransactionError::Transport(message) => TransactionError::Dropped(message),
                        classified => classified,
                    });
                }
            }
        }

        Err(TransactionError::Dropped(
            "status subscription ended before finality".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::chain_api::{MockChainApi, Submission};
    use crate::blockchain::dispatch_error::DispatchFailure;
    use crate::error::{ChainError, SignerError};
    use crate::wallet::key_management::{KeyManager, MockExternalSigner};
    use futures::stream;

    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    fn keyring() -> Arc<dyn ExternalSigner> {
        Arc::new(KeyManager::from_uris(&["//Alice".to_string()]).unwrap())
    }

    fn recorder() -> (StatusCallback, Arc<Mutex<Vec<TransactionStatus>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: StatusCallback = Arc::new(move |status| sink.lock().unwrap().push(status));
        (callback, seen)
    }

    fn chain_with_events(events: Vec<Result<TxEvent, ChainError>>) -> Arc<dyn ChainApi> {
        let mut chain = MockChainApi::new();
        chain.expect_submit_and_watch().return_once(move |_, _| {
            Ok(Submission {
                extrinsic_hash: "0xfeed".to_string(),
                events: stream::iter(events).boxed(),
            })
        });
        Arc::new(chain)
    }

    fn call() -> ChainCall {
        ChainCall::new("Credential", "revoke_credential", vec![])
    }

    #[tokio::test]
    async fn test_success_reports_stages_in_order() {
        let chain = chain_with_events(vec![
            Ok(TxEvent::Ready),
            Ok(TxEvent::InBlock { block_hash: "0xb1".into() }),
            Ok(TxEvent::Finalized { block_hash: "0xb1".into(), failure: None }),
        ]);
        let submitter = TransactionSubmitter::new(chain, keyring(), Duration::from_secs(60));
        let (callback, seen) = recorder();

        let result = submitter.submit(ALICE, call(), Some(callback)).await;

        assert!(result.success);
        assert_eq!(result.block_hash.as_deref(), Some("0xb1"));
        assert_eq!(result.transaction_hash.as_deref(), Some("0xfeed"));
        let stages: Vec<TxStage> = seen.lock().unwrap().iter().map(|s| s.status).collect();
        assert_eq!(
            stages,
            vec![TxStage::Signing, TxStage::Submitting, TxStage::InBlock, TxStage::Finalized]
        );
    }

    #[tokio::test]
    async fn test_module_failure_at_finality_is_reported() {
        let failure = DispatchFailure::module("Credential", "CredentialNotFound", "Credential not found");
        let chain = chain_with_events(vec![
            Ok(TxEvent::InBlock { block_hash: "0xb2".into() }),
            Ok(TxEvent::Finalized { block_hash: "0xb2".into(), failure: Some(failure) }),
        ]);
        let submitter = TransactionSubmitter::new(chain, keyring(), Duration::from_secs(60));
        let (callback, seen) = recorder();

        let result = submitter.submit(ALICE, call(), Some(callback)).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(TransactionErrorKind::Module));
        assert_eq!(
            result.error.as_deref(),
            Some("Credential.CredentialNotFound: Credential not found")
        );
        assert_eq!(seen.lock().unwrap().last().map(|s| s.status), Some(TxStage::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_subscription_times_out() {
        let mut chain = MockChainApi::new();
        chain.expect_submit_and_watch().return_once(|_, _| {
            Ok(Submission {
                extrinsic_hash: "0xslow".to_string(),
                events: stream::pending().boxed(),
            })
        });
        let submitter = TransactionSubmitter::new(Arc::new(chain), keyring(), Duration::from_secs(60));

        let result = submitter.submit(ALICE, call(), None).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(TransactionErrorKind::Timeout));
        assert_eq!(result.transaction_hash.as_deref(), Some("0xslow"));
    }

    #[tokio::test]
    async fn test_signer_rejection_never_reaches_the_node() {
        let mut chain = MockChainApi::new();
        chain.expect_submit_and_watch().never();
        let mut signer = MockExternalSigner::new();
        signer
            .expect_signer_for()
            .returning(|_| Err(SignerError::Rejected("Cancelled by user".into())));

        let submitter =
            TransactionSubmitter::new(Arc::new(chain), Arc::new(signer), Duration::from_secs(60));
        let result = submitter.submit(ALICE, call(), None).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(TransactionErrorKind::Rejected));
    }

    #[tokio::test]
    async fn test_pool_rejection_for_fees_is_insufficient_balance() {
        let mut chain = MockChainApi::new();
        chain.expect_submit_and_watch().return_once(|_, _| {
            Err(ChainError::Transport(
                "Invalid Transaction (1010): Inability to pay some fees".into(),
            ))
        });
        let submitter = TransactionSubmitter::new(Arc::new(chain), keyring(), Duration::from_secs(60));

        let result = submitter.submit(ALICE, call(), None).await;

        assert_eq!(result.error_kind, Some(TransactionErrorKind::InsufficientBalance));
        assert_eq!(result.transaction_hash, None);
    }

    #[tokio::test]
    async fn test_dropped_and_truncated_streams_fail() {
        let dropped = chain_with_events(vec![Ok(TxEvent::Dropped { message: "pool full".into() })]);
        let submitter = TransactionSubmitter::new(dropped, keyring(), Duration::from_secs(60));
        let result = submitter.submit(ALICE, call(), None).await;
        assert_eq!(result.error_kind, Some(TransactionErrorKind::Dropped));

        let truncated = chain_with_events(vec![Ok(TxEvent::InBlock { block_hash: "0xb3".into() })]);
        let submitter = TransactionSubmitter::new(truncated, keyring(), Duration::from_secs(60));
        let result = submitter.submit(ALICE, call(), None).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(TransactionErrorKind::Dropped));
    }
}
