//! The producing endpoint's cooperative loop.
//!
//! Samples are fed in as they arrive; [`Producer::poll`] is called every
//! loop iteration and does the time-gated work: one transport tick, and on
//! each publish interval a fresh reading is encoded, signed and published.
//! Nothing here sleeps, so a slow network never starves sample intake.

use crate::core::mac::SharedKey;
use crate::core::message::AuthenticatedMessage;
use crate::core::reading::{average_to_count, Reading};
use crate::core::window::{bpm_from_interval, SignalWindow};
use crate::sensor::types::{RawSample, SampleKind};
use crate::stats::SharedStats;
use crate::transport::{PublishError, Transport, TransportManager};
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

/// Default topic readings are published on.
pub const DEFAULT_TOPIC: &str = "vitals/readings";

/// Producer settings.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Topic to publish readings on
    pub topic: String,
    /// Time between publishes
    pub publish_interval: Duration,
    /// Plausible thermometer temperatures; anything else is a sensor fault
    pub temp_range: RangeInclusive<f64>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            publish_interval: Duration::from_secs(5),
            temp_range: -55.0..=125.0,
        }
    }
}

/// What happened on a publish tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// Reading signed and handed to the transport
    Published(Reading),
    /// No beat or temperature accepted yet
    NotReady,
    /// Reading dropped; the next interval publishes fresh data
    Dropped {
        reading: Reading,
        error: PublishError,
    },
}

pub struct Producer<T: Transport> {
    key: SharedKey,
    config: ProducerConfig,
    window: SignalWindow,
    last_bpm: Option<f64>,
    last_temp_c: Option<f64>,
    manager: TransportManager<T>,
    last_publish: Option<Instant>,
    started: Instant,
    reported_attempts: u64,
    stats: Option<SharedStats>,
}

impl<T: Transport> Producer<T> {
    pub fn new(
        key: SharedKey,
        config: ProducerConfig,
        window: SignalWindow,
        manager: TransportManager<T>,
    ) -> Self {
        Self {
            key,
            config,
            window,
            last_bpm: None,
            last_temp_c: None,
            manager,
            last_publish: None,
            started: Instant::now(),
            reported_attempts: 0,
            stats: None,
        }
    }

    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn window(&self) -> &SignalWindow {
        &self.window
    }

    pub fn manager(&self) -> &TransportManager<T> {
        &self.manager
    }

    /// Feed one raw sample. Returns whether it was accepted.
    pub fn ingest(&mut self, sample: &RawSample) -> bool {
        let accepted = match sample.kind {
            SampleKind::BeatInterval => match bpm_from_interval(sample.value) {
                Some(bpm) if self.window.accepts(bpm) => {
                    self.window.observe(bpm);
                    self.last_bpm = Some(bpm);
                    true
                }
                Some(bpm) => {
                    // Counted by the window as a discard
                    self.window.observe(bpm);
                    false
                }
                None => false,
            },
            SampleKind::Temperature => {
                if sample.value.is_finite() && self.config.temp_range.contains(&sample.value) {
                    self.last_temp_c = Some(sample.value);
                    true
                } else {
                    false
                }
            }
        };

        if accepted {
            if let Some(ref stats) = self.stats {
                stats.record_sample_accepted();
            }
        } else {
            tracing::debug!(
                source = %sample.source,
                kind = ?sample.kind,
                value = sample.value,
                "Discarded implausible sample"
            );
            if let Some(ref stats) = self.stats {
                stats.record_sample_discarded();
            }
        }
        accepted
    }

    /// The reading that would be published now, if enough data arrived.
    pub fn current_reading(&self) -> Option<Reading> {
        let temp_c = self.last_temp_c?;
        let bpm = self.last_bpm?;
        Reading::new(temp_c, bpm, average_to_count(self.window.average())).ok()
    }

    /// Run the time-gated work using the current time.
    pub fn poll(&mut self) -> Option<PublishOutcome> {
        self.poll_at(Instant::now())
    }

    /// Run the time-gated work as of `now`.
    ///
    /// Returns `Some` only on iterations where a publish was due.
    pub fn poll_at(&mut self, now: Instant) -> Option<PublishOutcome> {
        self.manager.tick_at(now);
        self.report_attempts();

        let due = self
            .last_publish
            .map_or(true, |at| now.saturating_duration_since(at) >= self.config.publish_interval);
        if !due {
            return None;
        }
        self.last_publish = Some(now);

        let Some(reading) = self.current_reading() else {
            tracing::debug!("No reading ready to publish");
            return Some(PublishOutcome::NotReady);
        };

        let message = AuthenticatedMessage::sign(&self.key, reading);
        let uptime_ms = now.saturating_duration_since(self.started).as_millis() as u64;

        match self.manager.publish(&self.config.topic, &message.to_wire()) {
            Ok(()) => {
                if let Some(ref stats) = self.stats {
                    stats.record_published();
                }
                tracing::info!(
                    topic = %self.config.topic,
                    uptime_ms,
                    temp_c = reading.temp_c(),
                    bpm = reading.bpm(),
                    avg_bpm = reading.avg_bpm(),
                    "Published reading"
                );
                Some(PublishOutcome::Published(reading))
            }
            Err(error) => {
                if let Some(ref stats) = self.stats {
                    stats.record_publish_failure();
                }
                tracing::warn!(uptime_ms, error = %error, "Dropped reading");
                Some(PublishOutcome::Dropped { reading, error })
            }
        }
    }

    fn report_attempts(&mut self) {
        let attempts = self.manager.attempts();
        if attempts > self.reported_attempts {
            if let Some(ref stats) = self.stats {
                stats.record_reconnect_attempts(attempts - self.reported_attempts);
            }
            self.reported_attempts = attempts;
        }
    }
}
