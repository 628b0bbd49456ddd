// src/models/credential.rs
//! Academic credential view objects.
//!
//! A credential is immutable once issued except for its revoked flag, which
//! only ever moves from `false` to `true`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Fixed enumeration of credential kinds.
///
/// Each kind has a display name (what users pick and see) and a variant name
/// (what the credential pallet stores).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialType {
    Degree,
    MastersDegree,
    Doctorate,
    Certificate,
    Transcript,
    ProfessionalCertification,
    Other,
}

static BY_NAME: Lazy<HashMap<&'static str, CredentialType>> = Lazy::new(|| {
    let mut names = HashMap::new();
    for kind in CredentialType::ALL {
        names.insert(kind.display_name(), kind);
        names.insert(kind.variant_name(), kind);
    }
    names
});

impl CredentialType {
    pub const ALL: [CredentialType; 7] = [
        CredentialType::Degree,
        CredentialType::MastersDegree,
        CredentialType::Doctorate,
        CredentialType::Certificate,
        CredentialType::Transcript,
        CredentialType::ProfessionalCertification,
        CredentialType::Other,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            CredentialType::Degree => "Bachelor's Degree",
            CredentialType::MastersDegree => "Master's Degree",
            CredentialType::Doctorate => "Doctorate (PhD)",
            CredentialType::Certificate => "Certificate",
            CredentialType::Transcript => "Transcript",
            CredentialType::ProfessionalCertification => "Professional Certification",
            CredentialType::Other => "Other",
        }
    }

    /// Variant name in the credential pallet's `CredentialType` enum.
    pub fn variant_name(&self) -> &'static str {
        match self {
            CredentialType::Degree => "Degree",
            CredentialType::MastersDegree => "MastersDegree",
            CredentialType::Doctorate => "Doctorate",
            CredentialType::Certificate => "Certificate",
            CredentialType::Transcript => "Transcript",
            CredentialType::ProfessionalCertification => "ProfessionalCertification",
            CredentialType::Other => "Other",
        }
    }

    /// Looks up a kind by display or variant name.
    pub fn parse(name: &str) -> Option<CredentialType> {
        BY_NAME.get(name.trim()).copied()
    }

    /// Maps a user-supplied name to a kind; unrecognised names become `Other`.
    pub fn from_display(name: &str) -> CredentialType {
        Self::parse(name).unwrap_or(CredentialType::Other)
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl Serialize for CredentialType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_name())
    }
}

impl<'de> Deserialize<'de> for CredentialType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(CredentialType::from_display(&name))
    }
}

/// Lifecycle status as presented to users.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Active,
    Revoked,
    Expired,
}

/// An issued, hash-anchored academic record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Credential {
    /// Credential identifier as `0x` hex
    pub id: String,
    /// SS58 address of the holder
    pub holder: String,
    /// SS58 address of the issuing institution
    pub issuer: String,
    /// Blake2b-256 content hash of the credential document
    pub credential_hash: String,
    pub credential_type: CredentialType,
    /// Metadata decoded to text, if any was attached
    pub metadata: Option<String>,
    /// Metadata parsed into an object; free text lands under `text`
    pub metadata_fields: Map<String, Value>,
    /// Block number of issuance
    pub issued_at: u64,
    /// Block number after which the credential is expired
    pub expires_at: Option<u64>,
    pub revoked: bool,
}

impl Credential {
    /// Computes the status relative to the given block.
    pub fn status_at(&self, current_block: u64) -> CredentialStatus {
        if self.revoked {
            return CredentialStatus::Revoked;
        }
        match self.expires_at {
            Some(expiry) if current_block > expiry => CredentialStatus::Expired,
            _ => CredentialStatus::Active,
        }
    }
}

/// Result of looking a document hash up in the `CredentialByHash` index.
///
/// Absence is a normal outcome: `found` is false and no error is implied.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VerificationOutcome {
    pub credential_hash: String,
    pub found: bool,
    pub credential: Option<Credential>,
    pub status: Option<CredentialStatus>,
}
