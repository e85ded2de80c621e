//! Pipeline statistics.
//!
//! Counts what the producer and the gateway did, without recording any
//! reading values or key material.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters shared by the producer loop and the gateway server.
#[derive(Debug)]
pub struct PipelineStats {
    /// Raw samples accepted into the window or as temperature
    samples_accepted: AtomicU64,
    /// Raw samples discarded by plausibility checks
    samples_discarded: AtomicU64,
    /// Readings handed to the transport successfully
    readings_published: AtomicU64,
    /// Readings dropped because publishing failed or the link was down
    publish_failures: AtomicU64,
    /// Reconnect attempts made by the transport manager
    reconnect_attempts: AtomicU64,
    /// Inbound messages accepted by the gateway
    accepted: AtomicU64,
    /// Inbound messages rejected as malformed
    malformed: AtomicU64,
    /// Inbound messages rejected on tag mismatch
    mismatched: AtomicU64,
    /// Process start time
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            samples_accepted: AtomicU64::new(0),
            samples_discarded: AtomicU64::new(0),
            readings_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            mismatched: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that persist to `path`, resuming any saved totals.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous statistics: {e}");
        }

        stats
    }

    pub fn record_sample_accepted(&self) {
        self.samples_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_discarded(&self) {
        self.samples_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.readings_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempts(&self, count: u64) {
        self.reconnect_attempts.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mismatch(&self) {
        self.mismatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_accepted: self.samples_accepted.load(Ordering::Relaxed),
            samples_discarded: self.samples_discarded.load(Ordering::Relaxed),
            readings_published: self.readings_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            mismatched: self.mismatched.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Pipeline Statistics:\n\
             - Samples accepted: {}\n\
             - Samples discarded: {}\n\
             - Readings published: {}\n\
             - Publish failures: {}\n\
             - Reconnect attempts: {}\n\
             - Gateway accepted: {}\n\
             - Gateway rejected (malformed): {}\n\
             - Gateway rejected (tag mismatch): {}\n\
             - Uptime: {} seconds",
            s.samples_accepted,
            s.samples_discarded,
            s.readings_published,
            s.publish_failures,
            s.reconnect_attempts,
            s.accepted,
            s.malformed,
            s.mismatched,
            s.uptime_secs
        )
    }

    /// Save totals to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let s = self.snapshot();
            let persisted = PersistedStats {
                samples_accepted: s.samples_accepted,
                samples_discarded: s.samples_discarded,
                readings_published: s.readings_published,
                publish_failures: s.publish_failures,
                reconnect_attempts: s.reconnect_attempts,
                accepted: s.accepted,
                malformed: s.malformed,
                mismatched: s.mismatched,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let p: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.samples_accepted.store(p.samples_accepted, Ordering::Relaxed);
                self.samples_discarded.store(p.samples_discarded, Ordering::Relaxed);
                self.readings_published.store(p.readings_published, Ordering::Relaxed);
                self.publish_failures.store(p.publish_failures, Ordering::Relaxed);
                self.reconnect_attempts.store(p.reconnect_attempts, Ordering::Relaxed);
                self.accepted.store(p.accepted, Ordering::Relaxed);
                self.malformed.store(p.malformed, Ordering::Relaxed);
                self.mismatched.store(p.mismatched, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub samples_accepted: u64,
    pub samples_discarded: u64,
    pub readings_published: u64,
    pub publish_failures: u64,
    pub reconnect_attempts: u64,
    pub accepted: u64,
    pub malformed: u64,
    pub mismatched: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    samples_accepted: u64,
    samples_discarded: u64,
    readings_published: u64,
    publish_failures: u64,
    reconnect_attempts: u64,
    accepted: u64,
    malformed: u64,
    mismatched: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared statistics.
pub type SharedStats = Arc<PipelineStats>;

pub fn create_shared_stats() -> SharedStats {
    Arc::new(PipelineStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedStats {
    Arc::new(PipelineStats::with_persistence(path))
}
