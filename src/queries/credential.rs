// src/queries/credential.rs
//! Credential lookups, including the holder, issuer and content-hash
//! secondary indexes.

use futures::future::join_all;
use log::{debug, error};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::blockchain::chain_api::{pallets, CallArg};
use crate::error::ChainError;
use crate::models::credential::{Credential, CredentialType, VerificationOutcome};
use crate::queries::StorageReader;
use crate::utils::crypto::parse_hash;
use crate::utils::serialization::{decode_hex_text, parse_metadata};

#[derive(Deserialize)]
struct RawCredential {
    credential_id: String,
    credential_hash: String,
    holder: String,
    issuer: String,
    credential_type: String,
    #[serde(default)]
    metadata: Option<String>,
    #[serde(default)]
    issued_at: u64,
    #[serde(default)]
    expires_at: Option<u64>,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct RawCredentialReference {
    credential_id: String,
}

fn parse_credential(raw: Value) -> Result<Credential, ChainError> {
    let raw: RawCredential = serde_json::from_value(raw)?;
    let text = raw.metadata.as_deref().map(decode_hex_text).unwrap_or_default();
    let (metadata, metadata_fields) = match raw.metadata {
        Some(encoded) if !text.is_empty() => (Some(text), parse_metadata(&encoded)),
        _ => (None, Map::new()),
    };

    Ok(Credential {
        id: raw.credential_id,
        holder: raw.holder,
        issuer: raw.issuer,
        credential_hash: raw.credential_hash,
        credential_type: CredentialType::parse(&raw.credential_type).unwrap_or(CredentialType::Other),
        metadata,
        metadata_fields,
        issued_at: raw.issued_at,
        expires_at: raw.expires_at,
        revoked: raw.status == "Revoked",
    })
}

/// Read access to the Credential pallet.
#[derive(Clone)]
pub struct CredentialQueries {
    reader: StorageReader,
}

impl CredentialQueries {
    pub fn new(reader: StorageReader) -> Self {
        CredentialQueries { reader }
    }

    /// Fetches a credential by its `0x` hex id.
    ///
    /// # Returns
    /// `None` if the id is not a 32-byte hex value, no credential has that
    /// id, or the lookup fails.
    pub async fn get_credential(&self, id: &str) -> Option<Credential> {
        parse_hash(id)?;
        self.fetch_credential(id).await.unwrap_or_else(|e| {
            error!("Error fetching credential {}: {}", id, e);
            None
        })
    }

    /// Resolves a document content hash through the `CredentialByHash` index.
    pub async fn get_credential_by_hash(&self, credential_hash: &str) -> Option<Credential> {
        parse_hash(credential_hash)?;
        self.fetch_credential_by_hash(credential_hash)
            .await
            .unwrap_or_else(|e| {
                error!("Error fetching credential by hash {}: {}", credential_hash, e);
                None
            })
    }

    /// Credentials held by `holder`. Index entries whose credential cannot
    /// be resolved are left out.
    pub async fn get_credentials_by_holder(&self, holder: &str) -> Vec<Credential> {
        if holder.trim().is_empty() {
            return Vec::new();
        }
        self.fetch_credentials_by_holder(holder).await.unwrap_or_else(|e| {
            error!("Error fetching credentials for holder {}: {}", holder, e);
            Vec::new()
        })
    }

    /// Credentials issued by `issuer`. Index entries whose credential cannot
    /// be resolved are left out.
    pub async fn get_credentials_by_issuer(&self, issuer: &str) -> Vec<Credential> {
        if issuer.trim().is_empty() {
            return Vec::new();
        }
        self.fetch_credentials_by_issuer(issuer).await.unwrap_or_else(|e| {
            error!("Error fetching credentials for issuer {}: {}", issuer, e);
            Vec::new()
        })
    }

    pub async fn verify_credential_exists(&self, credential_hash: &str) -> bool {
        self.get_credential_by_hash(credential_hash).await.is_some()
    }

    /// Looks a document hash up and reports what was found.
    ///
    /// An unknown hash is a normal outcome with `found == false`; it is not
    /// distinguished from a failed lookup.
    pub async fn verify_by_hash(&self, credential_hash: &str) -> VerificationOutcome {
        let credential = self.get_credential_by_hash(credential_hash).await;
        let status = match &credential {
            Some(credential) => {
                let block = self.reader.best_block().await.unwrap_or_else(|e| {
                    debug!("Best block unavailable, ignoring expiry: {}", e);
                    0
                });
                Some(credential.status_at(block))
            }
            None => None,
        };
        VerificationOutcome {
            credential_hash: credential_hash.trim().to_ascii_lowercase(),
            found: credential.is_some(),
            credential,
            status,
        }
    }

    pub(crate) async fn fetch_credential(&self, id: &str) -> Result<Option<Credential>, ChainError> {
        let key = parse_hash(id).ok_or_else(|| ChainError::InvalidArgument(id.to_string()))?;
        self.reader
            .fetch(pallets::CREDENTIAL, "Credentials", CallArg::bytes(key))
            .await?
            .map(parse_credential)
            .transpose()
    }

    pub(crate) async fn fetch_credential_by_hash(
        &self,
        credential_hash: &str,
    ) -> Result<Option<Credential>, ChainError> {
        let key = parse_hash(credential_hash)
            .ok_or_else(|| ChainError::InvalidArgument(credential_hash.to_string()))?;
        let Some(id) = self
            .reader
            .fetch(pallets::CREDENTIAL, "CredentialByHash", CallArg::bytes(key))
            .await?
        else {
            return Ok(None);
        };
        let id: String = serde_json::from_value(id)?;
        self.fetch_credential(&id).await
    }

    pub(crate) async fn fetch_credentials_by_holder(
        &self,
        holder: &str,
    ) -> Result<Vec<Credential>, ChainError> {
        let Some(raw) = self
            .reader
            .fetch(pallets::CREDENTIAL, "CredentialsByHolder", CallArg::account(holder))
            .await?
        else {
            return Ok(Vec::new());
        };
        let references: Vec<RawCredentialReference> = serde_json::from_value(raw)?;
        Ok(self
            .resolve(references.into_iter().map(|r| r.credential_id).collect())
            .await)
    }

    pub(crate) async fn fetch_credentials_by_issuer(
        &self,
        issuer: &str,
    ) -> Result<Vec<Credential>, ChainError> {
        let Some(raw) = self
            .reader
            .fetch(pallets::CREDENTIAL, "CredentialsByIssuer", CallArg::account(issuer))
            .await?
        else {
            return Ok(Vec::new());
        };
        let ids: Vec<String> = serde_json::from_value(raw)?;
        Ok(self.resolve(ids).await)
    }

    /// Fetches every id concurrently, keeping index order and dropping ids
    /// that fail or are missing.
    async fn resolve(&self, ids: Vec<String>) -> Vec<Credential> {
        let lookups = ids.iter().map(|id| self.fetch_credential(id));
        join_all(lookups)
            .await
            .into_iter()
            .zip(&ids)
            .filter_map(|(result, id)| match result {
                Ok(Some(credential)) => Some(credential),
                Ok(None) => {
                    debug!("Indexed credential {} not found", id);
                    None
                }
                Err(e) => {
                    debug!("Dropping credential {}: {}", id, e);
                    None
                }
            })
            .collect()
    }
}
