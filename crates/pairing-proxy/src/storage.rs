//! Per-number credential storage.
//!
//! Each phone number owns one directory under the storage root holding the
//! serialized authentication state. The credential file inside it is the
//! artifact read back and encoded for delivery once pairing succeeds.

use base64::Engine;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt credential file: {0}")]
    Corrupt(String),

    #[error("Credential file missing for {0}")]
    Missing(String),
}

/// Authentication state loaded from a number's directory.
#[derive(Debug, Clone)]
pub struct AuthState {
    /// Directory holding the state.
    pub dir: PathBuf,
    /// Persisted credentials, if any were written yet.
    pub creds: Option<serde_json::Value>,
}

impl AuthState {
    /// Whether the remote device has accepted a pairing for these credentials.
    pub fn is_registered(&self) -> bool {
        self.creds
            .as_ref()
            .and_then(|c| c.get("registered"))
            .and_then(|r| r.as_bool())
            .unwrap_or(false)
    }
}

/// Filesystem-backed credential store.
#[derive(Debug, Clone)]
pub struct AuthStore {
    root: PathBuf,
    credential_file: String,
}

impl AuthStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, credential_file: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            credential_file: credential_file.into(),
        }
    }

    /// Root directory of all per-number state.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a number.
    pub fn dir(&self, phone_number: &str) -> PathBuf {
        self.root.join(phone_number)
    }

    /// Path of the credential file for a number.
    pub fn credential_path(&self, phone_number: &str) -> PathBuf {
        self.dir(phone_number).join(&self.credential_file)
    }

    /// Acquire or create storage for a number.
    ///
    /// Corrupt state is discarded and reinitialized; the caller never sees it.
    pub async fn prepare(&self, phone_number: &str) -> Result<AuthState, StorageError> {
        let dir = self.dir(phone_number);
        fs::create_dir_all(&dir).await?;

        match self.load_creds(phone_number).await {
            Ok(creds) => Ok(AuthState { dir, creds }),
            Err(StorageError::Corrupt(reason)) => {
                warn!(phone_number = %phone_number, %reason, "Corrupt credential storage, reinitializing");
                self.reset(phone_number).await?;
                Ok(AuthState { dir, creds: None })
            }
            Err(e) => Err(e),
        }
    }

    async fn load_creds(
        &self,
        phone_number: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        let path = self.credential_path(phone_number);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    /// Persist a credential update.
    ///
    /// Written to a temp file and renamed so readers never observe a partial
    /// file.
    pub async fn save(
        &self,
        phone_number: &str,
        creds: &serde_json::Value,
    ) -> Result<(), StorageError> {
        let dir = self.dir(phone_number);
        fs::create_dir_all(&dir).await?;

        let path = self.credential_path(phone_number);
        let temp_path = path.with_extension("tmp");
        let data = serde_json::to_vec(creds).map_err(|e| StorageError::Corrupt(e.to_string()))?;

        fs::write(&temp_path, &data).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(phone_number = %phone_number, bytes = data.len(), "Saved credentials");
        Ok(())
    }

    /// Read the raw credential file.
    pub async fn read_credentials(&self, phone_number: &str) -> Result<Vec<u8>, StorageError> {
        match fs::read(self.credential_path(phone_number)).await {
            Ok(data) if !data.is_empty() => Ok(data),
            Ok(_) => Err(StorageError::Missing(phone_number.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::Missing(phone_number.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Discard and recreate a number's directory.
    pub async fn reset(&self, phone_number: &str) -> Result<(), StorageError> {
        self.erase(phone_number).await?;
        fs::create_dir_all(self.dir(phone_number)).await?;
        Ok(())
    }

    /// Delete a number's directory. No-op if it does not exist.
    pub async fn erase(&self, phone_number: &str) -> Result<(), StorageError> {
        match fs::remove_dir_all(self.dir(phone_number)).await {
            Ok(()) => {
                debug!(phone_number = %phone_number, "Erased credential storage");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Encode a harvested credential file for delivery.
pub fn encode_credential_blob(prefix: &str, raw: &[u8]) -> String {
    format!(
        "{}{}",
        prefix,
        base64::engine::general_purpose::STANDARD.encode(raw)
    )
}
