//! Session storage scoped to one display instance.
//!
//! `TabStorage` is a string key-value map that lives only as long as the
//! process and is never shared or written to disk. It can be disabled or
//! given a byte quota, and reports those failures the way browser session
//! storage does. `SessionStore` keeps the active session record under one
//! fixed key and swallows every storage failure.

use crate::api::{DisplayOptions, Session};
use crate::config::StorageConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Key holding the active session record
pub const SESSION_KEY: &str = "attend.display.session";

/// Storage failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage is disabled")]
    Disabled,
    #[error("storage quota exceeded ({needed} bytes needed, {quota} allowed)")]
    QuotaExceeded { needed: usize, quota: usize },
}

/// In-process key-value storage
#[derive(Debug)]
pub struct TabStorage {
    entries: RwLock<HashMap<String, String>>,
    enabled: bool,
    quota_bytes: Option<usize>,
}

impl TabStorage {
    pub fn new(config: &StorageConfig) -> Self {
        TabStorage {
            entries: RwLock::new(HashMap::new()),
            enabled: config.enabled,
            quota_bytes: config.quota(),
        }
    }

    pub fn unbounded() -> Self {
        TabStorage {
            entries: RwLock::new(HashMap::new()),
            enabled: true,
            quota_bytes: None,
        }
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        if !self.enabled {
            return Err(StorageError::Disabled);
        }
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    pub fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        if !self.enabled {
            return Err(StorageError::Disabled);
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        if let Some(quota) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(StorageError::QuotaExceeded { needed, quota });
            }
        }

        entries.insert(key.to_string(), value);
        Ok(())
    }

    pub fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        if !self.enabled {
            return Err(StorageError::Disabled);
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    /// Total bytes currently held (keys + values)
    pub fn used_bytes(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

/// Record persisted for the active session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub session: Session,
    pub session_code: String,
    #[serde(default)]
    pub total_enrolled: Option<u32>,
    #[serde(default)]
    pub students_scanned: u32,
    #[serde(default)]
    pub config: Option<DisplayOptions>,
}

/// Holds at most one active session. Cheap to clone; clones share storage.
#[derive(Debug, Clone)]
pub struct SessionStore {
    storage: Arc<TabStorage>,
}

impl SessionStore {
    pub fn new(storage: Arc<TabStorage>) -> Self {
        SessionStore { storage }
    }

    /// Record the active session. Failures are logged and ignored.
    pub fn store(&self, record: &StoredSession) {
        let value = match serde_json::to_string(record) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Failed to serialize session record: {}", e);
                return;
            }
        };
        if let Err(e) = self.storage.set_item(SESSION_KEY, value) {
            tracing::warn!("Session not stored: {}", e);
        }
    }

    /// The active session, or `None` when absent, unreadable or storage failed
    pub fn retrieve(&self) -> Option<StoredSession> {
        let raw = match self.storage.get_item(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Session not readable: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Discarding corrupt session record: {}", e);
                None
            }
        }
    }

    /// Forget the active session. Failures are logged and ignored.
    pub fn clear(&self) {
        if let Err(e) = self.storage.remove_item(SESSION_KEY) {
            tracing::warn!("Session not cleared: {}", e);
        }
    }
}
