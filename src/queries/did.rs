// src/queries/did.rs
//! Identity document and institution lookups.

use log::{debug, error};
use serde::Deserialize;
use serde_json::Value;

use crate::blockchain::chain_api::{pallets, CallArg};
use crate::error::ChainError;
use crate::models::did::{DidDocument, Institution, PublicKeyEntry};
use crate::queries::StorageReader;
use crate::utils::serialization::decode_hex_text;

#[derive(Deserialize)]
struct RawPublicKey {
    key_id: String,
    key_type: Value,
    public_key: String,
    #[serde(default)]
    created_at: Option<u64>,
}

#[derive(Deserialize)]
struct RawDidDocument {
    controller: String,
    #[serde(default)]
    public_keys: Vec<RawPublicKey>,
    #[serde(default)]
    created_at: u64,
    #[serde(default)]
    updated_at: u64,
    #[serde(default)]
    active: bool,
}

#[derive(Deserialize)]
struct RawInstitution {
    name: String,
    did: String,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    registered_at: u64,
}

fn parse_did(raw: Value) -> Result<DidDocument, ChainError> {
    let raw: RawDidDocument = serde_json::from_value(raw)?;
    Ok(DidDocument {
        controller: raw.controller,
        public_keys: raw
            .public_keys
            .into_iter()
            .map(|key| PublicKeyEntry {
                key_id: key.key_id,
                key_type: match key.key_type {
                    Value::String(name) => name,
                    other => other.to_string(),
                },
                public_key: key.public_key,
                created_at: key.created_at,
            })
            .collect(),
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        active: raw.active,
    })
}

fn parse_institution(address: &str, raw: Value) -> Result<Institution, ChainError> {
    let raw: RawInstitution = serde_json::from_value(raw)?;
    Ok(Institution {
        address: address.to_string(),
        name: decode_hex_text(&raw.name),
        did: raw.did,
        verified: raw.verified,
        registered_at: raw.registered_at,
    })
}

/// Read access to the DID pallet.
#[derive(Clone)]
pub struct DidQueries {
    reader: StorageReader,
}

impl DidQueries {
    pub fn new(reader: StorageReader) -> Self {
        DidQueries { reader }
    }

    /// Fetches the identity document controlled by `address`.
    ///
    /// # Returns
    /// `None` if the address is blank, has no document, or the lookup fails.
    pub async fn get_did(&self, address: &str) -> Option<DidDocument> {
        if address.trim().is_empty() {
            return None;
        }
        self.fetch_did(address).await.unwrap_or_else(|e| {
            error!("Error fetching DID for {}: {}", address, e);
            None
        })
    }

    /// Fetches the institution registered under `address`.
    ///
    /// # Returns
    /// `None` if the address is blank, is not an institution, or the lookup
    /// fails.
    pub async fn get_institution(&self, address: &str) -> Option<Institution> {
        if address.trim().is_empty() {
            return None;
        }
        self.fetch_institution(address).await.unwrap_or_else(|e| {
            error!("Error fetching institution {}: {}", address, e);
            None
        })
    }

    pub async fn is_institution(&self, address: &str) -> bool {
        self.get_institution(address).await.is_some()
    }

    pub async fn is_verified_institution(&self, address: &str) -> bool {
        self.get_institution(address)
            .await
            .map(|institution| institution.verified)
            .unwrap_or(false)
    }

    /// Lists every registered institution. Records that cannot be decoded are
    /// skipped.
    pub async fn get_all_institutions(&self) -> Vec<Institution> {
        match self.reader.entries(pallets::DID, "Institutions").await {
            Ok(entries) => entries
                .into_iter()
                .filter_map(|(address, raw)| match parse_institution(&address, raw) {
                    Ok(institution) => Some(institution),
                    Err(e) => {
                        debug!("Skipping institution {}: {}", address, e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                error!("Error fetching all institutions: {}", e);
                Vec::new()
            }
        }
    }

    pub(crate) async fn fetch_did(&self, address: &str) -> Result<Option<DidDocument>, ChainError> {
        self.reader
            .fetch(pallets::DID, "DidDocuments", CallArg::account(address))
            .await?
            .map(parse_did)
            .transpose()
    }

    pub(crate) async fn fetch_institution(
        &self,
        address: &str,
    ) -> Result<Option<Institution>, ChainError> {
        self.reader
            .fetch(pallets::DID, "Institutions", CallArg::account(address))
            .await?
            .map(|raw| parse_institution(address, raw))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::chain_api::{Capabilities, MockChainApi};
    use crate::blockchain::fake_chain::{FakeChain, ALICE, BOB};
    use serde_json::json;
    use std::sync::Arc;

    fn queries(chain: FakeChain) -> (Arc<FakeChain>, DidQueries) {
        let chain = Arc::new(chain);
        (chain.clone(), DidQueries::new(StorageReader::new(chain)))
    }

    #[tokio::test]
    async fn test_did_document_is_decoded() {
        let (chain, did) = queries(FakeChain::new());
        chain.put_storage(
            "Did",
            "DidDocuments",
            ALICE,
            json!({
                "controller": ALICE,
                "public_keys": [{"key_id": "0x01", "key_type": "Sr25519", "public_key": "0x02"}],
                "created_at": 5,
                "updated_at": 7,
                "active": true,
            }),
        );

        let doc = did.get_did(ALICE).await.unwrap();
        assert_eq!(doc.controller, ALICE);
        assert_eq!(doc.public_keys[0].key_type, "Sr25519");
        assert_eq!(doc.updated_at, 7);
        assert!(doc.active);
    }

    #[tokio::test]
    async fn test_absent_and_blank_keys_are_not_found() {
        let (_, did) = queries(FakeChain::new());
        assert!(did.get_did(BOB).await.is_none());
        assert!(did.get_did("   ").await.is_none());
        assert!(!did.is_institution(BOB).await);
    }

    #[tokio::test]
    async fn test_blank_key_never_reaches_node() {
        let mut chain = MockChainApi::new();
        chain.expect_capabilities().never();
        chain.expect_fetch_storage().never();
        let did = DidQueries::new(StorageReader::new(Arc::new(chain)));
        assert!(did.get_institution("").await.is_none());
    }

    #[tokio::test]
    async fn test_institution_name_is_hex_decoded() {
        let (chain, did) = queries(FakeChain::new());
        chain.put_storage(
            "Did",
            "Institutions",
            BOB,
            json!({"name": "0x4d4954", "did": BOB, "verified": true, "registered_at": 3}),
        );
        chain.put_storage(
            "Did",
            "Institutions",
            ALICE,
            json!({"name": 12}),
        );

        let institution = did.get_institution(BOB).await.unwrap();
        assert_eq!(institution.name, "MIT");
        assert!(did.is_verified_institution(BOB).await);

        // The malformed record is skipped, not fatal
        let all = did.get_all_institutions().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].address, BOB);
    }

    #[tokio::test]
    async fn test_faults_and_missing_pallet_become_not_found() {
        let (chain, did) = queries(FakeChain::new());
        chain.set_offline(true);
        assert!(did.get_did(ALICE).await.is_none());
        assert!(did.get_all_institutions().await.is_empty());

        let (chain, did) = queries(FakeChain::with_capabilities(Capabilities {
            did: false,
            ..Capabilities::all()
        }));
        chain.put_storage("Did", "DidDocuments", ALICE, json!({"controller": ALICE}));
        assert!(did.get_did(ALICE).await.is_none());
    }
}
