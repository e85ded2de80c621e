//! Fixed-capacity signal window with a running average.
//!
//! Derived measurements (beat rates) are kept in a circular buffer of the
//! last N accepted values. Values outside the plausibility range never touch
//! the buffer, so a sensor glitch cannot drag the average around.

use statrs::statistics::Statistics;
use std::ops::RangeInclusive;

/// Default number of slots in a window.
pub const DEFAULT_WINDOW_SIZE: usize = 8;

/// Default plausibility range for a derived beat rate, in beats per minute.
pub const DEFAULT_BPM_RANGE: RangeInclusive<f64> = 20.0..=255.0;

/// Convert the time between two beats into an instantaneous rate.
///
/// Returns `None` for non-positive or non-finite intervals.
pub fn bpm_from_interval(interval_ms: f64) -> Option<f64> {
    if interval_ms.is_finite() && interval_ms > 0.0 {
        Some(60_000.0 / interval_ms)
    } else {
        None
    }
}

/// A circular buffer of recent accepted samples and their mean.
///
/// The mean is taken over occupied slots only: before the buffer is full,
/// unfilled slots contribute nothing (no zero padding).
#[derive(Debug, Clone)]
pub struct SignalWindow {
    slots: Vec<f64>,
    capacity: usize,
    cursor: usize,
    len: usize,
    average: f64,
    range: RangeInclusive<f64>,
    discarded: u64,
}

impl SignalWindow {
    /// Create a window holding at most `capacity` samples.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize, range: RangeInclusive<f64>) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![0.0; capacity],
            capacity,
            cursor: 0,
            len: 0,
            average: 0.0,
            range,
            discarded: 0,
        }
    }

    /// Check whether a value would be accepted into the window.
    pub fn accepts(&self, value: f64) -> bool {
        value.is_finite() && self.range.contains(&value)
    }

    /// Feed one derived value and return the current average.
    ///
    /// Implausible values are dropped and the previous average is returned.
    pub fn observe(&mut self, value: f64) -> f64 {
        if !self.accepts(value) {
            self.discarded += 1;
            return self.average;
        }

        self.slots[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.capacity;
        if self.len < self.capacity {
            self.len += 1;
        }
        self.average = self.slots[..self.len].iter().mean();
        self.average
    }

    /// Current mean of occupied slots, or 0.0 when nothing was accepted yet.
    pub fn average(&self) -> f64 {
        self.average
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of values rejected by the plausibility check.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl Default for SignalWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE, DEFAULT_BPM_RANGE)
    }
}
