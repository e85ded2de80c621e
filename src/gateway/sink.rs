//! Downstream collaborators for gateway verdicts.
//!
//! Accepted readings go to a [`ReadingSink`] (the storage side); rejections
//! go to a [`RejectSink`] (the observability side). Both are append-only.

use crate::core::reading::Reading;
use crate::gateway::verifier::{RejectReason, Rejection};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// How much of a rejected payload is kept for diagnosis.
pub const REJECT_PREVIEW_BYTES: usize = 256;

/// Sink errors.
#[derive(Debug)]
pub enum SinkError {
    Io(String),
    Serialization(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(msg) => write!(f, "Sink IO error: {msg}"),
            SinkError::Serialization(msg) => write!(f, "Sink serialization error: {msg}"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Receives verified readings.
pub trait ReadingSink: Send + Sync {
    fn accept(&self, reading: &Reading) -> Result<(), SinkError>;
}

/// Receives rejected messages.
pub trait RejectSink: Send + Sync {
    fn reject(&self, rejection: &Rejection, inbound: &[u8]) -> Result<(), SinkError>;
}

/// One accepted reading as stored.
#[derive(Debug, Clone, Serialize)]
pub struct StoredReading {
    /// Receipt identifier
    pub id: Uuid,
    /// When the gateway accepted the reading
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub reading: Reading,
}

/// One rejection as logged.
#[derive(Debug, Clone, Serialize)]
pub struct RejectRecord {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    pub reason: RejectReason,
    pub detail: String,
    /// Length of the rejected payload in bytes
    pub payload_len: usize,
    /// Leading bytes of the payload, lossily decoded
    pub payload_preview: String,
}

impl RejectRecord {
    pub fn new(rejection: &Rejection, inbound: &[u8]) -> Self {
        let preview = &inbound[..inbound.len().min(REJECT_PREVIEW_BYTES)];
        Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            reason: rejection.reason,
            detail: rejection.detail.clone(),
            payload_len: inbound.len(),
            payload_preview: String::from_utf8_lossy(preview).into_owned(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Serialize `value` and append it as one line to `path`.
fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<(), SinkError> {
    let mut line =
        serde_json::to_string(value).map_err(|e| SinkError::Serialization(e.to_string()))?;
    line.push('\n');

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SinkError::Io(e.to_string()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SinkError::Io(format!("Failed to open {path:?}: {e}")))?;
    file.write_all(line.as_bytes())
        .map_err(|e| SinkError::Io(format!("Failed to write {path:?}: {e}")))
}

/// Appends accepted readings to a JSON Lines file.
pub struct JsonlStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReadingSink for JsonlStore {
    fn accept(&self, reading: &Reading) -> Result<(), SinkError> {
        let record = StoredReading {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            reading: *reading,
        };
        let _guard = lock(&self.write_lock);
        append_line(&self.path, &record)
    }
}

/// Logs rejections through `tracing` and optionally to a JSON Lines file.
pub struct RejectLog {
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl RejectLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            write_lock: Mutex::new(()),
        }
    }

    /// Only emit warnings, keep no file.
    pub fn log_only() -> Self {
        Self {
            path: None,
            write_lock: Mutex::new(()),
        }
    }
}

impl RejectSink for RejectLog {
    fn reject(&self, rejection: &Rejection, inbound: &[u8]) -> Result<(), SinkError> {
        let record = RejectRecord::new(rejection, inbound);
        tracing::warn!(
            id = %record.id,
            reason = %record.reason,
            detail = %record.detail,
            payload_len = record.payload_len,
            "Rejected reading"
        );

        match self.path {
            Some(ref path) => {
                let _guard = lock(&self.write_lock);
                append_line(path, &record)
            }
            None => Ok(()),
        }
    }
}

/// Keeps verdicts in memory.
#[derive(Default)]
pub struct MemorySink {
    accepted: Mutex<Vec<Reading>>,
    rejected: Mutex<Vec<Rejection>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepted(&self) -> Vec<Reading> {
        lock(&self.accepted).clone()
    }

    pub fn rejected(&self) -> Vec<Rejection> {
        lock(&self.rejected).clone()
    }
}

impl ReadingSink for MemorySink {
    fn accept(&self, reading: &Reading) -> Result<(), SinkError> {
        lock(&self.accepted).push(*reading);
        Ok(())
    }
}

impl RejectSink for MemorySink {
    fn reject(&self, rejection: &Rejection, _inbound: &[u8]) -> Result<(), SinkError> {
        lock(&self.rejected).push(rejection.clone());
        Ok(())
    }
}
