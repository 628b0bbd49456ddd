// src/wallet/key_management.rs
//! Signing keys for caller accounts.
//!
//! The transaction layer never touches key material directly. It asks an
//! [`ExternalSigner`] for the signing capability of an account, and the
//! signer may refuse. [`KeyManager`] is the local keyring implementation:
//! sr25519 keypairs derived from secret URIs such as `//Alice` or a mnemonic
//! phrase with a derivation path.

use async_trait::async_trait;
use log::{debug, info};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use subxt::utils::AccountId32;
use subxt_signer::sr25519::Keypair;
use subxt_signer::SecretUri;

use crate::error::SignerError;

/// Provides signing capabilities for accounts on request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExternalSigner: Send + Sync {
    /// Returns the keypair for `address`.
    ///
    /// # Errors
    /// Returns [`SignerError::Rejected`] if the signer holds no key for the
    /// account or declines to sign.
    async fn signer_for(&self, address: &str) -> Result<Keypair, SignerError>;

    /// SS58 addresses of the accounts this signer can sign for.
    fn accounts(&self) -> Vec<String>;
}

/// Local sr25519 keyring.
///
/// Keys are kept in memory only and indexed by their SS58 address (generic
/// Substrate prefix 42).
#[derive(Clone, Default)]
pub struct KeyManager {
    keys: Arc<RwLock<BTreeMap<String, Keypair>>>,
}

impl KeyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a keyring from a list of secret URIs.
    ///
    /// # Arguments
    /// * `uris` - Secret URIs, e.g. `//Alice` or `<mnemonic>//hard/soft`
    ///
    /// # Errors
    /// Returns [`SignerError::InvalidSecret`] for the first URI that cannot be
    /// parsed or derived.
    pub fn from_uris(uris: &[String]) -> Result<Self, SignerError> {
        let manager = KeyManager::new();
        for uri in uris {
            manager.add_uri(uri)?;
        }
        Ok(manager)
    }

    /// Derives a keypair from `uri` and adds it to the keyring.
    ///
    /// # Returns
    /// The SS58 address of the added account
    pub fn add_uri(&self, uri: &str) -> Result<String, SignerError> {
        // Never echo the secret itself in errors or logs
        let secret = SecretUri::from_str(uri)
            .map_err(|_| SignerError::InvalidSecret("unparsable secret URI".to_string()))?;
        let keypair = Keypair::from_uri(&secret)
            .map_err(|e| SignerError::InvalidSecret(e.to_string()))?;
        let address = address_of(&keypair);

        let mut keys = self
            .keys
            .write()
            .map_err(|_| SignerError::Rejected("keyring unavailable".to_string()))?;
        keys.insert(address.clone(), keypair);
        info!("Added signing key for {}", address);
        Ok(address)
    }
}

#[async_trait]
impl ExternalSigner for KeyManager {
    async fn signer_for(&self, address: &str) -> Result<Keypair, SignerError> {
        let normalized = normalize(address)
            .ok_or_else(|| SignerError::Rejected(format!("invalid account {}", address)))?;
        let keys = self
            .keys
            .read()
            .map_err(|_| SignerError::Rejected("keyring unavailable".to_string()))?;
        match keys.get(&normalized) {
            Some(keypair) => {
                debug!("Signing as {}", normalized);
                Ok(keypair.clone())
            }
            None => Err(SignerError::Rejected(format!(
                "no signing key for account {}",
                normalized
            ))),
        }
    }

    fn accounts(&self) -> Vec<String> {
        self.keys
            .read()
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// SS58 address (prefix 42) of a keypair's public key.
pub fn address_of(keypair: &Keypair) -> String {
    AccountId32(keypair.public_key().0).to_string()
}

/// Re-encodes an SS58 address with the generic prefix so keys match
/// regardless of the network prefix the caller used.
pub fn normalize(address: &str) -> Option<String> {
    AccountId32::from_str(address.trim())
        .ok()
        .map(|account| account.to_string())
}
