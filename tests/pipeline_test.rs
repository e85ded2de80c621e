//! Producer to gateway, in process.

use signed_vitals::core::SharedKey;
use signed_vitals::gateway::{Gateway, MemorySink, RejectReason, Router};
use signed_vitals::producer::{Producer, ProducerConfig, PublishOutcome};
use signed_vitals::sensor::{RawSample, SensorConfig, SignalModel};
use signed_vitals::stats::create_shared_stats;
use signed_vitals::transport::{Backoff, Transport, TransportError, TransportManager};
use signed_vitals::SignalWindow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Delivers publishes straight into a gateway router.
struct LoopbackTransport {
    router: Router,
    broker_up: Arc<AtomicBool>,
    connected: bool,
}

impl Transport for LoopbackTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = self.broker_up.load(Ordering::SeqCst);
        if self.connected {
            Ok(())
        } else {
            Err(TransportError::Connect("broker down".to_string()))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected && self.broker_up.load(Ordering::SeqCst)
    }

    fn publish(&mut self, _topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.router.dispatch(payload);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

struct Harness {
    producer: Producer<LoopbackTransport>,
    sink: Arc<MemorySink>,
    broker_up: Arc<AtomicBool>,
    model: SignalModel,
}

fn harness(producer_key: &[u8], gateway_key: &[u8]) -> Harness {
    let sink = Arc::new(MemorySink::new());
    let router = Router::new(
        Gateway::new(Arc::new(SharedKey::from_bytes(gateway_key).unwrap())),
        sink.clone(),
        sink.clone(),
    );
    let broker_up = Arc::new(AtomicBool::new(true));
    let transport = LoopbackTransport {
        router,
        broker_up: broker_up.clone(),
        connected: false,
    };
    let manager = TransportManager::new(
        transport,
        Backoff::new(Duration::from_millis(500), Duration::from_secs(4)),
    );
    let producer = Producer::new(
        SharedKey::from_bytes(producer_key).unwrap(),
        ProducerConfig::default(),
        SignalWindow::default(),
        manager,
    );

    Harness {
        producer,
        sink,
        broker_up,
        model: SignalModel::new(SensorConfig {
            source: "pipeline-test".to_string(),
            ..SensorConfig::default()
        }),
    }
}

impl Harness {
    /// Feed roughly one second of signal, then poll as of `now`.
    fn step(&mut self, now: Instant) -> Option<PublishOutcome> {
        for _ in 0..2 {
            let interval = self.model.next_interval_ms();
            self.producer.ingest(&RawSample::beat_interval("pipeline-test", interval));
        }
        let temp = self.model.next_temperature();
        self.producer.ingest(&RawSample::temperature("pipeline-test", temp));
        self.producer.poll_at(now)
    }
}

const KEY: &[u8] = b"pipeline shared key, 32 bytes ok";

#[test]
fn test_every_published_reading_is_accepted() {
    let mut h = harness(KEY, KEY);
    let stats = create_shared_stats();
    h.producer = h.producer.with_stats(stats.clone());
    let start = Instant::now();

    let mut published = Vec::new();
    for second in 0..300u64 {
        if let Some(PublishOutcome::Published(reading)) =
            h.step(start + Duration::from_secs(second))
        {
            published.push(reading);
        }
    }

    assert_eq!(published.len(), 60);
    assert_eq!(h.sink.accepted(), published);
    assert!(h.sink.rejected().is_empty());

    for reading in &published {
        assert!((60..=85).contains(&reading.avg_bpm()), "{reading:?}");
        assert!(reading.temp_c() > 36.0 && reading.temp_c() < 37.0);
    }

    // Glitched beats and disconnected-thermometer temperatures were discarded.
    assert!(stats.snapshot().samples_discarded > 0);
    assert!(h.producer.window().discarded() > 0);
}

#[test]
fn test_outage_drops_readings_and_recovers() {
    let mut h = harness(KEY, KEY);
    let start = Instant::now();
    let at = |s: u64| start + Duration::from_secs(s);

    for s in 0..10 {
        h.step(at(s));
    }
    assert_eq!(h.sink.accepted().len(), 2);

    h.broker_up.store(false, Ordering::SeqCst);
    let mut dropped = 0;
    for s in 10..60 {
        if let Some(PublishOutcome::Dropped { .. }) = h.step(at(s)) {
            dropped += 1;
        }
    }
    assert_eq!(dropped, 10);
    assert_eq!(h.sink.accepted().len(), 2);

    // No backlog: after recovery only fresh readings arrive.
    h.broker_up.store(true, Ordering::SeqCst);
    for s in 60..80 {
        h.step(at(s));
    }
    assert!(h.producer.manager().is_connected());
    // The reading due at 60s still falls inside the last backoff gap.
    assert_eq!(h.sink.accepted().len(), 5);
}

#[test]
fn test_wrong_key_is_rejected() {
    let mut h = harness(b"producer key that is wrong!", KEY);
    let start = Instant::now();

    for second in 0..30u64 {
        h.step(start + Duration::from_secs(second));
    }

    assert!(h.sink.accepted().is_empty());
    let rejected = h.sink.rejected();
    assert_eq!(rejected.len(), 6);
    assert!(rejected.iter().all(|r| r.reason == RejectReason::TagMismatch));
}
