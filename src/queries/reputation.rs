// src/queries/reputation.rs
//! Reputation score and endorsement lookups.

use log::{debug, error};
use serde::Deserialize;
use serde_json::Value;

use crate::blockchain::chain_api::{pallets, CallArg};
use crate::error::ChainError;
use crate::models::reputation::{Endorsement, ReputationScore};
use crate::queries::StorageReader;
use crate::utils::serialization::decode_hex_text;

#[derive(Deserialize)]
struct RawEndorsement {
    endorser: String,
    endorsee: String,
    endorsement_type: Value,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    created_at: u64,
    #[serde(default)]
    weight: u8,
}

fn parse_endorsements(raw: Value) -> Result<Vec<Endorsement>, ChainError> {
    let entries: Vec<Value> = serde_json::from_value(raw)?;
    // A single undecodable entry does not hide the rest of the list
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RawEndorsement>(entry) {
            Ok(raw) => Some(Endorsement {
                endorser: raw.endorser,
                endorsee: raw.endorsee,
                endorsement_type: match raw.endorsement_type {
                    Value::String(name) => name,
                    other => other.to_string(),
                },
                comment: decode_hex_text(&raw.comment),
                created_at: raw.created_at,
                weight: raw.weight,
            }),
            Err(e) => {
                debug!("Skipping endorsement: {}", e);
                None
            }
        })
        .collect())
}

/// Read access to the Reputation pallet.
#[derive(Clone)]
pub struct ReputationQueries {
    reader: StorageReader,
}

impl ReputationQueries {
    pub fn new(reader: StorageReader) -> Self {
        ReputationQueries { reader }
    }

    /// Reputation of `address`; an account with no recorded score, or a
    /// failed lookup, reads as all zeros.
    pub async fn get_reputation_score(&self, address: &str) -> ReputationScore {
        if address.trim().is_empty() {
            return ReputationScore::default();
        }
        self.fetch_reputation_score(address).await.unwrap_or_else(|e| {
            error!("Error fetching reputation for {}: {}", address, e);
            ReputationScore::default()
        })
    }

    pub async fn get_endorsements_received(&self, address: &str) -> Vec<Endorsement> {
        self.endorsements("EndorsementsReceived", address).await
    }

    pub async fn get_endorsements_given(&self, address: &str) -> Vec<Endorsement> {
        self.endorsements("EndorsementsGiven", address).await
    }

    async fn endorsements(&self, entry: &str, address: &str) -> Vec<Endorsement> {
        if address.trim().is_empty() {
            return Vec::new();
        }
        self.fetch_endorsements(entry, address).await.unwrap_or_else(|e| {
            error!("Error fetching {} for {}: {}", entry, address, e);
            Vec::new()
        })
    }

    pub(crate) async fn fetch_reputation_score(
        &self,
        address: &str,
    ) -> Result<ReputationScore, ChainError> {
        match self
            .reader
            .fetch(pallets::REPUTATION, "ReputationScores", CallArg::account(address))
            .await?
        {
            Some(raw) => Ok(serde_json::from_value(raw)?),
            None => Ok(ReputationScore::default()),
        }
    }

    pub(crate) async fn fetch_endorsements_received(
        &self,
        address: &str,
    ) -> Result<Vec<Endorsement>, ChainError> {
        self.fetch_endorsements("EndorsementsReceived", address).await
    }

    async fn fetch_endorsements(
        &self,
        entry: &str,
        address: &str,
    ) -> Result<Vec<Endorsement>, ChainError> {
        match self
            .reader
            .fetch(pallets::REPUTATION, entry, CallArg::account(address))
            .await?
        {
            Some(raw) => parse_endorsements(raw),
            None => Ok(Vec::new()),
        }
    }
}
