//! Simulated sensor producing beat intervals and thermometer temperatures.
//!
//! Stands in for the hardware driver so the producer can run anywhere. The
//! signal drifts slowly and injects the occasional glitch (a double-counted
//! beat, a disconnected thermometer reading -127) the way real hardware does.

use crate::sensor::types::RawSample;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Reading reported by a disconnected thermometer.
pub const THERMOMETER_DISCONNECTED_C: f64 = -127.0;

/// Configuration for the simulated signal.
#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// Source identifier stamped on every sample
    pub source: String,
    /// Resting beat rate the signal drifts around
    pub base_bpm: f64,
    /// Resting body temperature
    pub base_temp_c: f64,
    /// How often the thermometer is read
    pub temp_period: Duration,
    /// Every n-th beat is reported as a glitch (0 disables)
    pub glitch_every: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            source: crate::sensor::types::default_source_id(),
            base_bpm: 72.0,
            base_temp_c: 36.6,
            temp_period: Duration::from_secs(1),
            glitch_every: 25,
        }
    }
}

/// Errors that can occur while starting the sensor.
#[derive(Debug)]
pub enum SensorError {
    AlreadyRunning,
    SpawnFailed(String),
}

impl std::fmt::Display for SensorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorError::AlreadyRunning => write!(f, "Sensor is already running"),
            SensorError::SpawnFailed(e) => write!(f, "Failed to start sensor thread: {e}"),
        }
    }
}

impl std::error::Error for SensorError {}

/// A background thread emitting [`RawSample`]s into a bounded channel.
pub struct SimulatedSensor {
    config: SensorConfig,
    sender: Sender<RawSample>,
    receiver: Receiver<RawSample>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SimulatedSensor {
    pub fn new(config: SensorConfig) -> Self {
        // Bounded so a stalled consumer cannot grow memory without limit
        let (sender, receiver) = bounded(1_024);
        Self {
            config,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Start sampling in a background thread.
    pub fn start(&mut self) -> Result<(), SensorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SensorError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);

        let sender = self.sender.clone();
        let running = self.running.clone();
        let config = self.config.clone();

        let handle = thread::Builder::new()
            .name("simulated-sensor".to_string())
            .spawn(move || {
                run_sampling_loop(sender, running.clone(), config);
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                SensorError::SpawnFailed(e.to_string())
            })?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop sampling and join the thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for raw samples.
    pub fn receiver(&self) -> &Receiver<RawSample> {
        &self.receiver
    }
}

impl Drop for SimulatedSensor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Deterministic signal shape used by the sampling thread.
#[derive(Debug, Clone)]
pub struct SignalModel {
    config: SensorConfig,
    beats: u64,
    temps: u64,
}

impl SignalModel {
    pub fn new(config: SensorConfig) -> Self {
        Self {
            config,
            beats: 0,
            temps: 0,
        }
    }

    /// Next beat interval in milliseconds.
    pub fn next_interval_ms(&mut self) -> f64 {
        self.beats += 1;
        let phase = self.beats as f64 / 40.0;
        let bpm = self.config.base_bpm + 6.0 * phase.sin() + 1.5 * (phase * 7.0).cos();
        let interval = 60_000.0 / bpm;

        if self.config.glitch_every > 0 && self.beats % self.config.glitch_every == 0 {
            // Dicrotic notch counted as a beat
            interval / 8.0
        } else {
            interval
        }
    }

    /// Next thermometer temperature in degrees Celsius.
    pub fn next_temperature(&mut self) -> f64 {
        self.temps += 1;
        if self.temps % 60 == 0 {
            return THERMOMETER_DISCONNECTED_C;
        }
        let phase = self.temps as f64 / 120.0;
        self.config.base_temp_c + 0.3 * phase.sin()
    }
}

fn run_sampling_loop(sender: Sender<RawSample>, running: Arc<AtomicBool>, config: SensorConfig) {
    let source = config.source.clone();
    let temp_period = config.temp_period;
    let mut model = SignalModel::new(config);

    let mut next_beat = Instant::now();
    let mut next_temp = Instant::now();
    let mut pending_interval = model.next_interval_ms();

    while running.load(Ordering::SeqCst) {
        let now = Instant::now();

        if now >= next_beat {
            let sample = RawSample::beat_interval(source.as_str(), pending_interval);
            if sender.try_send(sample).is_err() {
                tracing::debug!("Sample channel full, dropping beat");
            }
            pending_interval = model.next_interval_ms();
            next_beat = now + Duration::from_secs_f64(pending_interval / 1000.0);
        }

        if now >= next_temp {
            let sample = RawSample::temperature(source.as_str(), model.next_temperature());
            if sender.try_send(sample).is_err() {
                tracing::debug!("Sample channel full, dropping temperature");
            }
            next_temp = now + temp_period;
        }

        let wake = next_beat.min(next_temp);
        let nap = wake
            .saturating_duration_since(Instant::now())
            .min(Duration::from_millis(50));
        thread::sleep(nap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::window::{bpm_from_interval, SignalWindow};
    use crate::sensor::types::SampleKind;

    fn config() -> SensorConfig {
        SensorConfig {
            source: "test-sensor".to_string(),
            temp_period: Duration::from_millis(10),
            ..SensorConfig::default()
        }
    }

    #[test]
    fn test_model_glitches_are_implausible() {
        let mut model = SignalModel::new(config());
        let window = SignalWindow::default();

        for beat in 1..=100u64 {
            let bpm = bpm_from_interval(model.next_interval_ms()).unwrap();
            if beat % 25 == 0 {
                assert!(!window.accepts(bpm), "glitch at beat {beat} accepted: {bpm}");
            } else {
                assert!(window.accepts(bpm), "beat {beat} rejected: {bpm}");
            }
        }
    }

    #[test]
    fn test_model_thermometer_disconnects() {
        let mut model = SignalModel::new(config());
        let temps: Vec<f64> = (0..120).map(|_| model.next_temperature()).collect();
        assert_eq!(temps[59], THERMOMETER_DISCONNECTED_C);
        assert!(temps[0] > 36.0 && temps[0] < 37.0);
    }

    #[test]
    fn test_sensor_start_stop() {
        let mut sensor = SimulatedSensor::new(config());
        sensor.start().unwrap();
        assert!(sensor.is_running());
        assert!(matches!(sensor.start(), Err(SensorError::AlreadyRunning)));

        let sample = sensor
            .receiver()
            .recv_timeout(Duration::from_secs(2))
            .expect("no sample produced");
        assert_eq!(sample.source, "test-sensor");
        assert!(matches!(
            sample.kind,
            SampleKind::BeatInterval | SampleKind::Temperature
        ));

        sensor.stop();
        assert!(!sensor.is_running());
    }
}
