//! Persistence for the durable credential triple.
//!
//! Only `id_token`/`refresh_token`/`installation_id` survive a restart;
//! the ephemeral Firebase fields live and die with one pairing flow.

use chrono::{DateTime, Utc};
use core::fmt;
use log::debug;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::PathBuf;

/// The persisted credential blob, keyed per device by file path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub installation_id: Option<String>,
    /// When the blob was last written; informational only.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "token store io error: {}", e),
            StoreError::Json(e) => write!(f, "token store json error: {}", e),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        StoreError::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Json(value)
    }
}

/// External collaborator that persists/loads the credential triple.
pub trait TokenStore {
    /// Returns `None` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<StoredTokens>, StoreError>;
    fn save(&self, tokens: &StoredTokens) -> Result<(), StoreError>;
}

/// JSON-file backed store, one file per configured device.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileTokenStore { path: path.into() }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<StoredTokens>, StoreError> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let tokens: StoredTokens = serde_json::from_str(&raw)?;
        debug!("Tokens loaded from {}", self.path.display());
        Ok(Some(tokens))
    }

    fn save(&self, tokens: &StoredTokens) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(tokens)?;
        fs::write(&self.path, raw)?;
        debug!("Tokens saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> FileTokenStore {
        let mut path = std::env::temp_dir();
        path.push(format!("quatt-telemetry-test-{}-{}.json", std::process::id(), name));
        let _ = fs::remove_file(&path);
        FileTokenStore::new(path)
    }

    #[test]
    fn load_missing_file_is_none() {
        let store = temp_store("missing");
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = temp_store("roundtrip");
        let tokens = StoredTokens {
            id_token: Some("id".into()),
            refresh_token: Some("refresh".into()),
            installation_id: Some("INS-0001".into()),
            updated_at: Some(Utc::now()),
        };
        store.save(&tokens).unwrap();
        let loaded = store.load().unwrap().expect("blob present");
        assert_eq!(loaded.id_token, tokens.id_token);
        assert_eq!(loaded.refresh_token, tokens.refresh_token);
        assert_eq!(loaded.installation_id, tokens.installation_id);
    }

    #[test]
    fn load_accepts_blob_without_timestamp() {
        let store = temp_store("legacy");
        let raw = r#"{"id_token": "id", "refresh_token": "r", "installation_id": null}"#;
        fs::write(&store.path, raw).unwrap();
        let loaded = store.load().unwrap().expect("blob present");
        assert_eq!(loaded.id_token.as_deref(), Some("id"));
        assert!(loaded.updated_at.is_none());
    }
}
