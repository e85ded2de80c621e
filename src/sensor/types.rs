//! Raw sample types handed over by the sensor collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a raw sample measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    /// Milliseconds between two detected beats
    BeatInterval,
    /// Thermometer temperature in degrees Celsius
    Temperature,
}

/// An instantaneous measurement. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSample {
    /// Identifier of the producing sensor
    pub source: String,
    /// What was measured
    pub kind: SampleKind,
    /// Measured value in the unit implied by `kind`
    pub value: f64,
    /// Timestamp when the sample was taken
    pub timestamp: DateTime<Utc>,
}

impl RawSample {
    pub fn new(source: impl Into<String>, kind: SampleKind, value: f64) -> Self {
        Self {
            source: source.into(),
            kind,
            value,
            timestamp: Utc::now(),
        }
    }

    pub fn beat_interval(source: impl Into<String>, interval_ms: f64) -> Self {
        Self::new(source, SampleKind::BeatInterval, interval_ms)
    }

    pub fn temperature(source: impl Into<String>, celsius: f64) -> Self {
        Self::new(source, SampleKind::Temperature, celsius)
    }
}

/// Build a source identifier from the host name.
pub fn default_source_id() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("vitals-{hostname}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_constructors() {
        let beat = RawSample::beat_interval("bench", 850.0);
        assert_eq!(beat.kind, SampleKind::BeatInterval);
        assert_eq!(beat.value, 850.0);

        let temp = RawSample::temperature("bench", 36.6);
        assert_eq!(temp.kind, SampleKind::Temperature);
        assert_eq!(temp.source, "bench");
    }

    #[test]
    fn test_default_source_id_prefix() {
        assert!(default_source_id().starts_with("vitals-"));
    }
}
