// src/models/did.rs
//! Identity document and institution view objects.
//!
//! These mirror records held by the chain's DID pallet. They are derived,
//! read-only snapshots; nothing here is persisted locally.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Signature scheme of a public key registered on an identity document.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Ed25519,
    Sr25519,
    Ecdsa,
}

impl KeyType {
    /// Variant name used by the DID pallet.
    pub fn variant_name(&self) -> &'static str {
        match self {
            KeyType::Ed25519 => "Ed25519",
            KeyType::Sr25519 => "Sr25519",
            KeyType::Ecdsa => "Ecdsa",
        }
    }
}

impl FromStr for KeyType {
    type Err = String;

    /// Parses a key type name, ignoring case (`ECDSA` and `Ecdsa` are equal).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ed25519" => Ok(KeyType::Ed25519),
            "sr25519" => Ok(KeyType::Sr25519),
            "ecdsa" => Ok(KeyType::Ecdsa),
            other => Err(format!("unknown key type `{}`", other)),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.variant_name())
    }
}

/// A public key bound to an identity document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PublicKeyEntry {
    /// Key identifier as `0x` hex
    pub key_id: String,
    /// Key type tag; kept as text so unknown schemes still render
    pub key_type: String,
    /// Raw key material as `0x` hex
    pub public_key: String,
    /// Block at which the key was added, when the chain records it
    pub created_at: Option<u64>,
}

/// A decentralized identifier record binding an account to its public keys.
///
/// Identity documents are never deleted on chain; they are only marked
/// inactive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DidDocument {
    /// SS58 address of the controlling account
    pub controller: String,
    pub public_keys: Vec<PublicKeyEntry>,
    /// Block number of creation
    pub created_at: u64,
    /// Block number of the last update
    pub updated_at: u64,
    pub active: bool,
}

/// An identity registered as a credential-issuing organization.
///
/// The `verified` flag can only be changed by a privileged (sudo) call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Institution {
    /// SS58 address the institution is registered under
    pub address: String,
    /// Display name, hex-decoded from storage
    pub name: String,
    /// Identity the institution is bound to
    pub did: String,
    pub verified: bool,
    /// Block number of registration
    pub registered_at: u64,
}
