// src/services/session.rs
//! Application session.
//!
//! Holds the state the service shares between requests: the accounts the
//! signer can act for, which of them is selected, and a per-account
//! notification inbox. The selection survives restarts through the local
//! cache; notifications live in memory only.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::storage::local_cache::LocalCache;
use crate::wallet::key_management::{normalize, ExternalSigner};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RequestReceived,
    RequestApproved,
    RequestRejected,
    CredentialIssued,
    CredentialRevoked,
    EndorsementReceived,
    System,
}

/// One entry in an account's inbox.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: String,
    /// SS58 address of the inbox owner
    pub recipient: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

/// A notification before it is addressed and stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
}

impl Notice {
    fn new(kind: NotificationKind, title: &str, message: String, action_url: &str) -> Self {
        Notice {
            kind,
            title: title.to_string(),
            message,
            action_url: Some(action_url.to_string()),
        }
    }

    pub fn request_received(requester: &str, program: &str) -> Self {
        Notice::new(
            NotificationKind::RequestReceived,
            "New Credential Request",
            format!("{} has requested a credential for {}", requester, program),
            "/institution/requests",
        )
    }

    pub fn request_approved(institution: &str, program: &str) -> Self {
        Notice::new(
            NotificationKind::RequestApproved,
            "Request Approved",
            format!("{} approved your request for {}", institution, program),
            "/my-requests",
        )
    }

    pub fn request_rejected(institution: &str, program: &str) -> Self {
        Notice::new(
            NotificationKind::RequestRejected,
            "Request Rejected",
            format!("{} rejected your request for {}", institution, program),
            "/my-requests",
        )
    }

    pub fn credential_issued(institution: &str, credential_type: &str) -> Self {
        Notice::new(
            NotificationKind::CredentialIssued,
            "Credential Issued",
            format!("{} issued your {}", institution, credential_type),
            "/credentials",
        )
    }

    pub fn credential_revoked(institution: &str, credential_type: &str) -> Self {
        Notice::new(
            NotificationKind::CredentialRevoked,
            "Credential Revoked",
            format!("Your {} from {} has been revoked", credential_type, institution),
            "/credentials",
        )
    }

    pub fn endorsement_received(endorser: &str) -> Self {
        Notice::new(
            NotificationKind::EndorsementReceived,
            "New Endorsement",
            format!("{} endorsed your institution", endorser),
            "/institution",
        )
    }
}

/// Shared application context.
pub struct Session {
    signer: Arc<dyn ExternalSigner>,
    cache: Arc<LocalCache>,
    /// Newest first, keyed by normalized address
    inbox: RwLock<HashMap<String, Vec<Notification>>>,
}

impl Session {
    pub fn new(signer: Arc<dyn ExternalSigner>, cache: Arc<LocalCache>) -> Self {
        Session {
            signer,
            cache,
            inbox: RwLock::new(HashMap::new()),
        }
    }

    /// Accounts the signer can act for.
    pub fn accounts(&self) -> Vec<String> {
        self.signer.accounts()
    }

    /// The account transactions default to.
    ///
    /// # Returns
    /// The persisted selection if the signer still holds it, otherwise the
    /// first available account, or `None` without any accounts.
    pub async fn selected_account(&self) -> Option<String> {
        let accounts = self.accounts();
        match self.cache.selected_account().await {
            Some(selected) if accounts.contains(&selected) => Some(selected),
            _ => accounts.into_iter().next(),
        }
    }

    /// Selects `address` if the signer holds it.
    ///
    /// # Returns
    /// The normalized address, or `None` if the account is unknown and the
    /// selection was left unchanged.
    pub async fn select_account(&self, address: &str) -> Option<String> {
        let normalized = normalize(address)?;
        if !self.accounts().contains(&normalized) {
            debug!("Ignoring selection of unknown account {}", address);
            return None;
        }
        self.cache.set_selected_account(Some(normalized.clone())).await;
        info!("Selected account {}", normalized);
        Some(normalized)
    }

    /// Forgets the persisted selection.
    pub async fn disconnect(&self) {
        self.cache.set_selected_account(None).await;
    }

    /// Adds `notice` to the inbox of `recipient`.
    pub async fn notify(&self, recipient: &str, notice: Notice) -> Option<Notification> {
        let recipient = normalize(recipient)?;
        let now = Utc::now();
        let notification = Notification {
            id: format!("notif_{}_{:08x}", now.timestamp_millis(), rand::random::<u32>()),
            recipient: recipient.clone(),
            kind: notice.kind,
            title: notice.title,
            message: notice.message,
            read: false,
            created_at: now,
            action_url: notice.action_url,
        };
        self.inbox
            .write()
            .await
            .entry(recipient)
            .or_default()
            .insert(0, notification.clone());
        Some(notification)
    }

    /// Inbox of `address`, newest first.
    pub async fn notifications(&self, address: &str) -> Vec<Notification> {
        let Some(address) = normalize(address) else {
            return Vec::new();
        };
        self.inbox.read().await.get(&address).cloned().unwrap_or_default()
    }

    pub async fn unread_count(&self, address: &str) -> usize {
        self.notifications(address).await.iter().filter(|n| !n.read).count()
    }

    /// Marks one notification as read; returns whether it existed.
    pub async fn mark_read(&self, address: &str, id: &str) -> bool {
        self.update_inbox(address, |inbox| match inbox.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        })
        .await
    }

    pub async fn mark_all_read(&self, address: &str) {
        self.update_inbox(address, |inbox| inbox.iter_mut().for_each(|n| n.read = true))
            .await;
    }

    pub async fn remove_notification(&self, address: &str, id: &str) -> bool {
        self.update_inbox(address, |inbox| {
            let before = inbox.len();
            inbox.retain(|n| n.id != id);
            inbox.len() != before
        })
        .await
    }

    pub async fn clear_notifications(&self, address: &str) {
        self.update_inbox(address, |inbox| inbox.clear()).await;
    }

    async fn update_inbox<T: Default>(
        &self,
        address: &str,
        apply: impl FnOnce(&mut Vec<Notification>) -> T,
    ) -> T {
        let Some(address) = normalize(address) else {
            return T::default();
        };
        match self.inbox.write().await.get_mut(&address) {
            Some(inbox) => apply(inbox),
            None => T::default(),
        }
    }
}
