//! Token Store
//!
//! In-memory record of the current credential, the last acquisition and the
//! recent call log, written through to a diagnostics snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::types::{AcquisitionRecord, CallHistoryBuffer, CallRecord, Credential};

/// Persisted view of a credential. The bearer string itself is never written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSummary {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub fingerprint: String,
    pub source: String,
    /// Set once the remote service refused this credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
}

impl From<&Credential> for CredentialSummary {
    fn from(credential: &Credential) -> Self {
        Self {
            subject: credential.claims().subject.clone(),
            group_id: credential.group_id().map(String::from),
            expires_at: credential.expires_at(),
            fingerprint: credential.fingerprint().to_string(),
            source: credential.source().to_string(),
            rejected_at: None,
        }
    }
}

/// Token file contents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub credential: Option<CredentialSummary>,
    pub last_acquisition: Option<AcquisitionRecord>,
    pub api_calls: Vec<CallRecord>,
    pub saved_at: DateTime<Utc>,
}

/// Snapshot sink.
#[async_trait]
pub trait SnapshotWriter: Send + Sync {
    async fn write(&self, snapshot: &TokenSnapshot) -> Result<(), StorageError>;

    async fn remove(&self) -> Result<(), StorageError>;
}

/// Writes pretty JSON to a file, replacing it atomically.
pub struct FileSnapshotWriter {
    path: PathBuf,
}

impl FileSnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotWriter for FileSnapshotWriter {
    async fn write(&self, snapshot: &TokenSnapshot) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(snapshot).map_err(|e| StorageError::Serialization {
            message: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::WriteFailed {
                    message: format!("{}: {}", parent.display(), e),
                })?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &json)
            .await
            .map_err(|e| StorageError::WriteFailed {
                message: format!("{}: {}", temp.display(), e),
            })?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| StorageError::WriteFailed {
                message: format!("{}: {}", self.path.display(), e),
            })
    }

    async fn remove(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed {
                message: format!("{}: {}", self.path.display(), e),
            }),
        }
    }
}

/// Discards snapshots.
#[derive(Default)]
pub struct NoopSnapshotWriter;

#[async_trait]
impl SnapshotWriter for NoopSnapshotWriter {
    async fn write(&self, _snapshot: &TokenSnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    async fn remove(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Keeps the latest snapshot in memory (for testing).
#[derive(Default)]
pub struct MemorySnapshotWriter {
    latest: std::sync::Mutex<Option<TokenSnapshot>>,
    writes: AtomicUsize,
}

impl MemorySnapshotWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<TokenSnapshot> {
        self.latest.lock().ok().and_then(|latest| latest.clone())
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotWriter for MemorySnapshotWriter {
    async fn write(&self, snapshot: &TokenSnapshot) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(snapshot.clone());
        }
        Ok(())
    }

    async fn remove(&self) -> Result<(), StorageError> {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = None;
        }
        Ok(())
    }
}

struct StoreState {
    credential: Option<CredentialSummary>,
    last_acquisition: Option<AcquisitionRecord>,
    calls: CallHistoryBuffer,
}

/// Shared diagnostics state.
///
/// The in-memory state is authoritative; the snapshot is never read back.
pub struct TokenStore {
    state: Mutex<StoreState>,
    writer: Arc<dyn SnapshotWriter>,
    write_lock: Mutex<()>,
}

impl TokenStore {
    pub fn new(call_history_capacity: usize, writer: Arc<dyn SnapshotWriter>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                credential: None,
                last_acquisition: None,
                calls: CallHistoryBuffer::new(call_history_capacity),
            }),
            writer,
            write_lock: Mutex::new(()),
        }
    }

    /// Store without persistence.
    pub fn in_memory(call_history_capacity: usize) -> Self {
        Self::new(call_history_capacity, Arc::new(NoopSnapshotWriter))
    }

    /// Record an acquisition outcome and the credential it produced, if any.
    pub async fn record_acquisition(&self, record: AcquisitionRecord, credential: Option<&Credential>) {
        {
            let mut state = self.state.lock().await;
            state.credential = credential.map(CredentialSummary::from);
            state.last_acquisition = Some(record);
        }
        self.persist().await;
    }

    /// Mark the stored credential as refused by the remote service.
    pub async fn record_rejection(&self, credential: &Credential) {
        {
            let mut state = self.state.lock().await;
            match state.credential.as_mut() {
                Some(summary) if summary.fingerprint == credential.fingerprint() => {
                    summary.rejected_at = Some(Utc::now());
                }
                _ => return,
            }
        }
        self.persist().await;
    }

    /// Append one gateway attempt, evicting the oldest when full.
    pub async fn record_call(&self, record: CallRecord) {
        self.state.lock().await.calls.push(record);
        self.persist().await;
    }

    /// Recorded calls, oldest first.
    pub async fn call_history(&self) -> Vec<CallRecord> {
        self.state.lock().await.calls.to_vec()
    }

    pub async fn call_history_capacity(&self) -> usize {
        self.state.lock().await.calls.capacity()
    }

    pub async fn last_acquisition(&self) -> Option<AcquisitionRecord> {
        self.state.lock().await.last_acquisition.clone()
    }

    pub async fn credential(&self) -> Option<CredentialSummary> {
        self.state.lock().await.credential.clone()
    }

    pub async fn snapshot(&self) -> TokenSnapshot {
        let state = self.state.lock().await;
        TokenSnapshot {
            credential: state.credential.clone(),
            last_acquisition: state.last_acquisition.clone(),
            api_calls: state.calls.to_vec(),
            saved_at: Utc::now(),
        }
    }

    /// Forget everything and remove the persisted snapshot.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        {
            let mut state = self.state.lock().await;
            state.credential = None;
            state.last_acquisition = None;
            state.calls.clear();
        }
        self.writer.remove().await
    }

    /// Snapshots are taken under the write lock so the file never goes back
    /// in time.
    async fn persist(&self) {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.snapshot().await;
        match self.writer.write(&snapshot).await {
            Ok(()) => debug!(api_calls = snapshot.api_calls.len(), "Token snapshot written"),
            Err(e) => warn!(error = %e, "Failed to write token snapshot"),
        }
    }
}
