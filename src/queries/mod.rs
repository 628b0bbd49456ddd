// src/queries/mod.rs
//! Query layer.
//!
//! Read-only accessors over chain storage, one per pallet, plus aggregate
//! views. No method here returns an error: absence, a missing pallet and a
//! failed lookup all read as "not found" (`None`, an empty list or a zeroed
//! score). Faults are logged before being swallowed, so transient network
//! errors look the same as genuine absence to callers.

pub mod credential;
pub mod did;
pub mod reputation;

use futures::try_join;
use log::{error, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::blockchain::chain_api::{pallets, CallArg, Capabilities, ChainApi, ChainInfo};
use crate::error::ChainError;
use crate::models::credential::Credential;
use crate::models::did::{DidDocument, Institution};
use crate::models::reputation::{Endorsement, ReputationScore};

pub use credential::CredentialQueries;
pub use did::DidQueries;
pub use reputation::ReputationQueries;

/// Storage access shared by the per-pallet accessors.
///
/// Lookups against a pallet the runtime does not expose are skipped with a
/// warning and read as empty.
#[derive(Clone)]
pub struct StorageReader {
    chain: Arc<dyn ChainApi>,
}

impl StorageReader {
    pub fn new(chain: Arc<dyn ChainApi>) -> Self {
        StorageReader { chain }
    }

    pub async fn fetch(
        &self,
        pallet: &str,
        entry: &str,
        key: CallArg,
    ) -> Result<Option<Value>, ChainError> {
        if !self.chain.capabilities().await?.supports(pallet) {
            warn!("{} pallet not available; {} reads as empty", pallet, entry);
            return Ok(None);
        }
        self.chain.fetch_storage(pallet, entry, vec![key]).await
    }

    pub async fn entries(&self, pallet: &str, entry: &str) -> Result<Vec<(String, Value)>, ChainError> {
        if !self.chain.capabilities().await?.supports(pallet) {
            warn!("{} pallet not available; {} reads as empty", pallet, entry);
            return Ok(Vec::new());
        }
        self.chain.account_map_entries(pallet, entry).await
    }

    pub async fn best_block(&self) -> Result<u64, ChainError> {
        self.chain.best_block_number().await
    }
}

/// Everything known about one account.
#[derive(Serialize, Debug, Clone)]
pub struct UserData {
    pub address: String,
    pub did: Option<DidDocument>,
    pub institution: Option<Institution>,
    pub credentials: Vec<Credential>,
    pub reputation: ReputationScore,
    pub is_institution: bool,
    pub is_verified: bool,
}

/// An institution together with what it has issued and how it is regarded.
#[derive(Serialize, Debug, Clone)]
pub struct InstitutionData {
    pub address: String,
    pub institution: Option<Institution>,
    pub issued_credentials: Vec<Credential>,
    pub reputation: ReputationScore,
    pub endorsements_received: Vec<Endorsement>,
    pub is_verified: bool,
}

/// Connection state of the chain node.
#[derive(Serialize, Debug, Clone)]
pub struct ChainStatus {
    pub connected: bool,
    pub info: Option<ChainInfo>,
    pub capabilities: Option<Capabilities>,
}

/// Entry point to the query layer.
#[derive(Clone)]
pub struct BlockchainQueries {
    pub did: DidQueries,
    pub credential: CredentialQueries,
    pub reputation: ReputationQueries,
    chain: Arc<dyn ChainApi>,
}

impl BlockchainQueries {
    pub fn new(chain: Arc<dyn ChainApi>) -> Self {
        let reader = StorageReader::new(chain.clone());
        BlockchainQueries {
            did: DidQueries::new(reader.clone()),
            credential: CredentialQueries::new(reader.clone()),
            reputation: ReputationQueries::new(reader),
            chain,
        }
    }

    /// Identity, institution record, held credentials and reputation of
    /// `address`, fetched concurrently.
    ///
    /// # Returns
    /// `None` if any of the lookups fails; no partial view is returned.
    pub async fn get_user_data(&self, address: &str) -> Option<UserData> {
        if address.trim().is_empty() {
            return None;
        }
        let batch = try_join!(
            self.did.fetch_did(address),
            self.did.fetch_institution(address),
            self.credential.fetch_credentials_by_holder(address),
            self.reputation.fetch_reputation_score(address),
        );
        match batch {
            Ok((did, institution, credentials, reputation)) => Some(UserData {
                address: address.to_string(),
                is_institution: institution.is_some(),
                is_verified: institution.as_ref().map(|i| i.verified).unwrap_or(false),
                did,
                institution,
                credentials,
                reputation,
            }),
            Err(e) => {
                error!("Error fetching user data for {}: {}", address, e);
                None
            }
        }
    }

    /// Institution record, issued credentials, reputation and received
    /// endorsements of `address`, fetched concurrently.
    ///
    /// # Returns
    /// `None` if any of the lookups fails.
    pub async fn get_institution_data(&self, address: &str) -> Option<InstitutionData> {
        if address.trim().is_empty() {
            return None;
        }
        let batch = try_join!(
            self.did.fetch_institution(address),
            self.credential.fetch_credentials_by_issuer(address),
            self.reputation.fetch_reputation_score(address),
            self.reputation.fetch_endorsements_received(address),
        );
        match batch {
            Ok((institution, issued_credentials, reputation, endorsements_received)) => {
                Some(InstitutionData {
                    address: address.to_string(),
                    is_verified: institution.as_ref().map(|i| i.verified).unwrap_or(false),
                    institution,
                    issued_credentials,
                    reputation,
                    endorsements_received,
                })
            }
            Err(e) => {
                error!("Error fetching institution data for {}: {}", address, e);
                None
            }
        }
    }

    /// Free balance of `address` in the chain's smallest unit.
    pub async fn get_free_balance(&self, address: &str) -> Option<u128> {
        if address.trim().is_empty() {
            return None;
        }
        let account = match self
            .chain
            .fetch_storage(pallets::SYSTEM, "Account", vec![CallArg::account(address)])
            .await
        {
            Ok(Some(account)) => account,
            // Accounts that were never funded have no entry
            Ok(None) => return Some(0),
            Err(e) => {
                error!("Error fetching balance for {}: {}", address, e);
                return None;
            }
        };
        match &account["data"]["free"] {
            Value::Number(n) => n.as_u64().map(u128::from),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Whether `address` can cover `required` from its free balance. A failed
    /// lookup counts as insufficient.
    pub async fn check_sufficient_balance(&self, address: &str, required: u128) -> bool {
        self.get_free_balance(address)
            .await
            .map(|free| free >= required)
            .unwrap_or(false)
    }

    /// Reports whether the node is reachable and what it exposes.
    pub async fn chain_status(&self) -> ChainStatus {
        match self.chain.chain_info().await {
            Ok(info) => ChainStatus {
                connected: true,
                info: Some(info),
                capabilities: self.chain.capabilities().await.ok(),
            },
            Err(e) => {
                error!("Chain node unavailable: {}", e);
                ChainStatus {
                    connected: false,
                    info: None,
                    capabilities: None,
                }
            }
        }
    }
}
