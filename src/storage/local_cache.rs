// src/storage/local_cache.rs
//! Local discardable cache.
//!
//! Remembers metadata about documents that were hashed through this service
//! (keyed by their content hash) and the account the operator last selected.
//! The cache is a convenience only: a missing or corrupt file loads as empty
//! and failed writes are logged and ignored.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Metadata recorded for a hashed document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FileReference {
    /// Blake2b-256 content hash as `0x` hex
    pub hash: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub stored_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
struct CacheState {
    #[serde(default)]
    files: BTreeMap<String, FileReference>,
    #[serde(default)]
    selected_account: Option<String>,
}

/// JSON-file backed cache shared by the services.
pub struct LocalCache {
    path: PathBuf,
    state: RwLock<CacheState>,
}

impl LocalCache {
    /// Opens the cache at `path`, starting empty if the file is missing or
    /// unreadable.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Discarding unreadable cache {}: {}", path.display(), e);
                CacheState::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheState::default(),
            Err(e) => {
                warn!("Could not read cache {}: {}", path.display(), e);
                CacheState::default()
            }
        };
        LocalCache {
            path,
            state: RwLock::new(state),
        }
    }

    /// Records metadata for a hashed document, replacing any earlier entry
    /// with the same hash.
    pub async fn store_file_reference(&self, reference: FileReference) {
        let mut state = self.state.write().await;
        state.files.insert(reference.hash.to_ascii_lowercase(), reference);
        self.persist(&state).await;
    }

    pub async fn file_reference(&self, hash: &str) -> Option<FileReference> {
        self.state.read().await.files.get(&hash.to_ascii_lowercase()).cloned()
    }

    /// All recorded documents, most recent first.
    pub async fn file_references(&self) -> Vec<FileReference> {
        let mut files: Vec<FileReference> = self.state.read().await.files.values().cloned().collect();
        files.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));
        files
    }

    pub async fn selected_account(&self) -> Option<String> {
        self.state.read().await.selected_account.clone()
    }

    pub async fn set_selected_account(&self, account: Option<String>) {
        let mut state = self.state.write().await;
        state.selected_account = account;
        self.persist(&state).await;
    }

    async fn persist(&self, state: &CacheState) {
        let bytes = match serde_json::to_vec_pretty(state) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not serialize cache: {}", e);
                return;
            }
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!("Could not create cache directory {}: {}", parent.display(), e);
                return;
            }
        }
        match tokio::fs::write(&self.path, bytes).await {
            Ok(()) => debug!("Cache written to {}", self.path.display()),
            Err(e) => warn!("Could not write cache {}: {}", self.path.display(), e),
        }
    }
}
