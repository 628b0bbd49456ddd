// src/models/request.rs
//! Credential requests from holders to issuing institutions.
//!
//! There is no on-chain store for requests: they live only in this process and
//! are lost on restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Fulfilled,
    Cancelled,
}

impl RequestStatus {
    /// Whether a request may move from `self` to `next`.
    ///
    /// `pending` can be approved, rejected or cancelled; `approved` can be
    /// fulfilled or cancelled. Rejected, fulfilled and cancelled are final.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
                | (RequestStatus::Pending, RequestStatus::Cancelled)
                | (RequestStatus::Approved, RequestStatus::Fulfilled)
                | (RequestStatus::Approved, RequestStatus::Cancelled)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Fulfilled => "fulfilled",
            RequestStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Fields a holder supplies when asking for a credential.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct NewCredentialRequest {
    pub requester: String,
    pub institution: String,
    pub credential_type: String,
    pub program_name: String,
    pub field_of_study: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
    /// Content hashes of uploaded supporting documents
    #[serde(default)]
    pub supporting_documents: Vec<String>,
}

/// A pending ask from a holder to an issuer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CredentialRequest {
    pub id: String,
    pub requester: String,
    pub institution: String,
    pub credential_type: String,
    pub program_name: String,
    pub field_of_study: String,
    pub start_date: String,
    pub end_date: String,
    pub student_id: Option<String>,
    pub additional_notes: Option<String>,
    pub supporting_documents: Vec<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub rejection_reason: Option<String>,
    /// Hash of the issuing transaction once fulfilled
    pub transaction_hash: Option<String>,
}
