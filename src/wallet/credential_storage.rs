// src/wallet/credential_storage.rs
//! Credential request storage.
//!
//! Holders ask institutions for credentials through requests that are kept
//! in memory by this process only. Nothing here is written to the chain and
//! requests do not survive a restart.

use chrono::Utc;
use std::collections::HashMap;

use crate::error::RequestError;
use crate::models::request::{CredentialRequest, NewCredentialRequest, RequestStatus};

/// In-memory store of credential requests keyed by request id.
///
/// Not synchronised; callers share it behind a lock.
#[derive(Debug, Default)]
pub struct CredentialRequestStorage {
    requests: HashMap<String, CredentialRequest>,
}

impl CredentialRequestStorage {
    /// Creates a new empty store.
    pub fn new() -> Self {
        CredentialRequestStorage {
            requests: HashMap::new(),
        }
    }

    /// Records a new pending request.
    ///
    /// # Arguments
    /// * `new` - Fields supplied by the requester
    ///
    /// # Returns
    /// The stored request with its generated id
    ///
    /// # Errors
    /// Returns [`RequestError::MissingField`] if the requester, institution,
    /// credential type or program name is blank.
    pub fn create(&mut self, new: NewCredentialRequest) -> Result<CredentialRequest, RequestError> {
        for (field, value) in [
            ("requester", &new.requester),
            ("institution", &new.institution),
            ("credential_type", &new.credential_type),
            ("program_name", &new.program_name),
        ] {
            if value.trim().is_empty() {
                return Err(RequestError::MissingField(field.to_string()));
            }
        }

        let now = Utc::now();
        let id = format!("req_{}_{:08x}", now.timestamp_millis(), rand::random::<u32>());
        let request = CredentialRequest {
            id: id.clone(),
            requester: new.requester,
            institution: new.institution,
            credential_type: new.credential_type,
            program_name: new.program_name,
            field_of_study: new.field_of_study,
            start_date: new.start_date,
            end_date: new.end_date,
            student_id: new.student_id.filter(|s| !s.trim().is_empty()),
            additional_notes: new.additional_notes.filter(|s| !s.trim().is_empty()),
            supporting_documents: new.supporting_documents,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
            reviewed_at: None,
            reviewed_by: None,
            rejection_reason: None,
            transaction_hash: None,
        };
        self.requests.insert(id, request.clone());
        Ok(request)
    }

    /// Retrieves a request by its id.
    pub fn get(&self, id: &str) -> Option<&CredentialRequest> {
        self.requests.get(id)
    }

    /// Requests made by `requester`, newest first.
    pub fn by_requester(&self, requester: &str) -> Vec<CredentialRequest> {
        self.filtered(|r| r.requester == requester)
    }

    /// Requests addressed to `institution`, newest first.
    pub fn by_institution(&self, institution: &str) -> Vec<CredentialRequest> {
        self.filtered(|r| r.institution == institution)
    }

    pub fn by_status(&self, status: RequestStatus) -> Vec<CredentialRequest> {
        self.filtered(|r| r.status == status)
    }

    /// Number of requests awaiting review by `institution`.
    pub fn pending_count(&self, institution: &str) -> usize {
        self.requests
            .values()
            .filter(|r| r.institution == institution && r.status == RequestStatus::Pending)
            .count()
    }

    /// Approves a pending request.
    pub fn approve(&mut self, id: &str, reviewer: &str) -> Result<CredentialRequest, RequestError> {
        self.transition(id, RequestStatus::Approved, |request| {
            request.reviewed_at = Some(Utc::now());
            request.reviewed_by = Some(reviewer.to_string());
        })
    }

    /// Rejects a pending request with a reason shown to the requester.
    pub fn reject(
        &mut self,
        id: &str,
        reviewer: &str,
        reason: &str,
    ) -> Result<CredentialRequest, RequestError> {
        self.transition(id, RequestStatus::Rejected, |request| {
            request.reviewed_at = Some(Utc::now());
            request.reviewed_by = Some(reviewer.to_string());
            request.rejection_reason = Some(reason.to_string());
        })
    }

    pub fn cancel(&mut self, id: &str) -> Result<CredentialRequest, RequestError> {
        self.transition(id, RequestStatus::Cancelled, |_| {})
    }

    /// Marks an approved request as fulfilled by the issuing transaction.
    pub fn fulfil(&mut self, id: &str, transaction_hash: &str) -> Result<CredentialRequest, RequestError> {
        self.transition(id, RequestStatus::Fulfilled, |request| {
            request.transaction_hash = Some(transaction_hash.to_string());
        })
    }

    /// Removes a request from storage.
    ///
    /// # Returns
    /// `true` if the request was present and removed
    pub fn remove(&mut self, id: &str) -> bool {
        self.requests.remove(id).is_some()
    }


    fn transition(
        &mut self,
        id: &str,
        next: RequestStatus,
        update: impl FnOnce(&mut CredentialRequest),
    ) -> Result<CredentialRequest, RequestError> {
        let request = self
            .requests
            .get_mut(id)
            .ok_or_else(|| RequestError::NotFound(id.to_string()))?;
        if !request.status.can_transition_to(next) {
            return Err(RequestError::InvalidTransition {
                from: request.status.to_string(),
                to: next.to_string(),
            });
        }
        request.status = next;
        request.updated_at = Utc::now();
        update(request);
        Ok(request.clone())
    }

    fn filtered(&self, keep: impl Fn(&CredentialRequest) -> bool) -> Vec<CredentialRequest> {
        let mut out: Vec<CredentialRequest> = self.requests.values().filter(|r| keep(r)).cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_request(requester: &str, institution: &str) -> NewCredentialRequest {
        NewCredentialRequest {
            requester: requester.to_string(),
            institution: institution.to_string(),
            credential_type: "Bachelor's Degree".to_string(),
            program_name: "Computer Science".to_string(),
            field_of_study: "Distributed Systems".to_string(),
            start_date: "2020-09-01".to_string(),
            end_date: "2024-06-30".to_string(),
            student_id: Some("  ".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_and_lookup() {
        let mut storage = CredentialRequestStorage::new();
        let request = storage.create(new_request("holder", "uni")).unwrap();

        assert_eq!(request.status, RequestStatus::Pending);
        assert!(request.id.starts_with("req_"));
        assert_eq!(request.student_id, None);
        assert_eq!(storage.get(&request.id), Some(&request));
        assert_eq!(storage.pending_count("uni"), 1);
        assert_eq!(storage.by_requester("holder").len(), 1);
        assert!(storage.by_institution("other").is_empty());
    }

    #[test]
    fn test_missing_field_is_refused() {
        let mut storage = CredentialRequestStorage::new();
        let err = storage.create(new_request("holder", " ")).unwrap_err();
        assert_eq!(err, RequestError::MissingField("institution".to_string()));
        assert!(storage.by_requester("holder").is_empty());
    }

    #[test]
    fn test_review_then_fulfil() {
        let mut storage = CredentialRequestStorage::new();
        let id = storage.create(new_request("holder", "uni")).unwrap().id;

        let approved = storage.approve(&id, "uni").unwrap();
        assert_eq!(approved.reviewed_by.as_deref(), Some("uni"));
        assert_eq!(storage.pending_count("uni"), 0);

        let fulfilled = storage.fulfil(&id, "0xabc").unwrap();
        assert_eq!(fulfilled.status, RequestStatus::Fulfilled);
        assert_eq!(fulfilled.transaction_hash.as_deref(), Some("0xabc"));

        // Final states stay final
        let err = storage.cancel(&id).unwrap_err();
        assert!(matches!(err, RequestError::InvalidTransition { .. }));
    }

    #[test]
    fn test_reject_records_reason_and_blocks_fulfil() {
        let mut storage = CredentialRequestStorage::new();
        let id = storage.create(new_request("holder", "uni")).unwrap().id;

        let rejected = storage.reject(&id, "uni", "Missing transcript").unwrap();
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Missing transcript"));
        assert_eq!(storage.by_status(RequestStatus::Rejected).len(), 1);

        assert!(storage.fulfil(&id, "0x1").is_err());
    }

    #[test]
    fn test_unknown_id_and_remove() {
        let mut storage = CredentialRequestStorage::new();
        assert_eq!(
            storage.approve("req_missing", "uni").unwrap_err(),
            RequestError::NotFound("req_missing".to_string())
        );

        let id = storage.create(new_request("holder", "uni")).unwrap().id;
        assert!(storage.remove(&id));
        assert!(!storage.remove(&id));
        assert!(storage.get(&id).is_none());
    }
}
