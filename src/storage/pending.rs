//! Durable record of a connect flow in progress.
//!
//! A connect hands the browser to an external consent page and the process
//! may be gone by the time the provider redirects back. The record written
//! before leaving is how the callback recovers which provider it is resuming
//! and which `state` value to expect.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Provider;

/// Errors from the pending connect store.
#[derive(Debug, Error)]
pub enum PendingStoreError {
    #[error("pending connect io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pending connect record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for pending store operations.
pub type Result<T> = std::result::Result<T, PendingStoreError>;

/// A connect flow that left the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConnect {
    pub provider: Provider,
    /// `state` parameter of the authorization URL, if it had one.
    pub state: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl PendingConnect {
    pub fn new(provider: Provider, state: Option<String>) -> Self {
        Self {
            provider,
            state,
            started_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.started_at > ttl
    }
}

/// Storage for the single in-progress connect flow.
#[async_trait]
pub trait PendingConnectStore: Send + Sync {
    /// Records `pending`, replacing any earlier record.
    async fn save(&self, pending: &PendingConnect) -> Result<()>;

    /// Removes and returns the record.
    async fn take(&self) -> Result<Option<PendingConnect>>;
}

/// JSON file store under the application data directory.
#[derive(Debug, Clone)]
pub struct FilePendingStore {
    path: PathBuf,
}

impl FilePendingStore {
    pub const FILE_NAME: &'static str = "pending_connect.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `dir/pending_connect.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PendingStoreError {
        PendingStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl PendingConnectStore for FilePendingStore {
    async fn save(&self, pending: &PendingConnect) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_vec(pending)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tracing::debug!(provider = %pending.provider, path = %self.path.display(), "Saved pending connect");
        Ok(())
    }

    async fn take(&self) -> Result<Option<PendingConnect>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        // Remove before parsing so a corrupt record is not retried forever.
        tokio::fs::remove_file(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

/// In-process store for hosts that keep running across the consent flow.
#[derive(Debug, Default)]
pub struct MemoryPendingStore {
    slot: Mutex<Option<PendingConnect>>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record without consuming it.
    pub fn peek(&self) -> Option<PendingConnect> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PendingConnect>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PendingConnectStore for MemoryPendingStore {
    async fn save(&self, pending: &PendingConnect) -> Result<()> {
        *self.lock() = Some(pending.clone());
        Ok(())
    }

    async fn take(&self) -> Result<Option<PendingConnect>> {
        Ok(self.lock().take())
    }
}
