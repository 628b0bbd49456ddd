// src/models/reputation.rs
//! Reputation snapshots and endorsements.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Aggregate reputation for one identity, recomputed by the chain.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ReputationScore {
    #[serde(default)]
    pub credentials_issued: u32,
    #[serde(default)]
    pub credentials_verified: u32,
    #[serde(default)]
    pub endorsements_received: u32,
    #[serde(default)]
    pub endorsements_given: u32,
    /// Overall score, 0-1000
    #[serde(default)]
    pub total_score: u32,
}

impl ReputationScore {
    pub fn tier(&self) -> ReputationTier {
        ReputationTier::for_score(self.total_score)
    }
}

/// Score band shown alongside a reputation score.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReputationTier {
    New,
    Established,
    Reputable,
    Excellent,
}

impl ReputationTier {
    pub fn for_score(score: u32) -> Self {
        match score {
            751.. => ReputationTier::Excellent,
            501..=750 => ReputationTier::Reputable,
            201..=500 => ReputationTier::Established,
            _ => ReputationTier::New,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndorsementType {
    Professional,
    Academic,
    Research,
    Teaching,
    Innovation,
}

impl EndorsementType {
    pub fn variant_name(&self) -> &'static str {
        match self {
            EndorsementType::Professional => "Professional",
            EndorsementType::Academic => "Academic",
            EndorsementType::Research => "Research",
            EndorsementType::Teaching => "Teaching",
            EndorsementType::Innovation => "Innovation",
        }
    }
}

impl FromStr for EndorsementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "professional" => Ok(EndorsementType::Professional),
            "academic" => Ok(EndorsementType::Academic),
            "research" => Ok(EndorsementType::Research),
            "teaching" => Ok(EndorsementType::Teaching),
            "innovation" => Ok(EndorsementType::Innovation),
            other => Err(format!("unknown endorsement type `{}`", other)),
        }
    }
}

/// One endorsement between two identities.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Endorsement {
    pub endorser: String,
    pub endorsee: String,
    /// Endorsement type as stored; unknown variants are kept verbatim
    pub endorsement_type: String,
    /// Comment decoded to text
    pub comment: String,
    /// Block number at which the endorsement was given
    pub created_at: u64,
    /// Strength, 1-10
    pub weight: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(ReputationTier::for_score(0), ReputationTier::New);
        assert_eq!(ReputationTier::for_score(200), ReputationTier::New);
        assert_eq!(ReputationTier::for_score(201), ReputationTier::Established);
        assert_eq!(ReputationTier::for_score(500), ReputationTier::Established);
        assert_eq!(ReputationTier::for_score(501), ReputationTier::Reputable);
        assert_eq!(ReputationTier::for_score(751), ReputationTier::Excellent);
        assert_eq!(ReputationTier::for_score(1000), ReputationTier::Excellent);
    }

    #[test]
    fn test_missing_score_fields_default_to_zero() {
        let score: ReputationScore = serde_json::from_str(r#"{"total_score": 300}"#).unwrap();
        assert_eq!(score.credentials_issued, 0);
        assert_eq!(score.tier(), ReputationTier::Established);
    }

    #[test]
    fn test_endorsement_type_parsing() {
        assert_eq!("academic".parse::<EndorsementType>(), Ok(EndorsementType::Academic));
        assert!("Sports".parse::<EndorsementType>().is_err());
    }
}
