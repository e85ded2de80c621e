//! Signed Vitals - source-authenticated vital-sign telemetry.
//!
//! A producing endpoint smooths raw beat intervals into a rate, builds a
//! small reading, encodes it canonically and signs it with HMAC-SHA256
//! under a pre-shared key. A verification gateway re-derives the canonical
//! bytes from the parsed reading, recomputes the tag, and routes every
//! message to exactly one of an accepted or a rejected sink.
//!
//! # Guarantees
//!
//! - **Canonical bytes**: fixed key order, fixed precision, no whitespace
//! - **Constant-time verification**: tag comparison never short-circuits
//! - **Non-blocking producer**: a dead link drops readings instead of
//!   stalling sample intake
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── producer ────────────────────────┐
//! │  ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌───────┐ │
//! │  │  Sensor  │──▶│  Signal  │──▶│ Canonical │──▶│  MAC  │ │
//! │  │ samples  │   │  window  │   │  encoder  │   │ codec │ │
//! │  └──────────┘   └──────────┘   └───────────┘   └───────┘ │
//! │                                                    │      │
//! │                                   ┌────────────────▼────┐ │
//! │                                   │ Transport manager   │ │
//! │                                   └────────────────┬────┘ │
//! └────────────────────────────────────────────────────┼──────┘
//!                                                      ▼
//! ┌──────────────────────── gateway ─────────────────────────┐
//! │  parse ──▶ re-derive canonical ──▶ verify ──▶ router     │
//! │                                     accepted │ rejected  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use signed_vitals::core::{Reading, SharedKey, AuthenticatedMessage};
//! use signed_vitals::gateway::{Gateway, Verdict};
//! use std::sync::Arc;
//!
//! let key = SharedKey::from_bytes(b"example shared key").unwrap();
//! let reading = Reading::new(36.52, 72.3, 70).unwrap();
//! let wire = AuthenticatedMessage::sign(&key, reading).to_wire();
//!
//! let gateway = Gateway::new(Arc::new(key));
//! assert_eq!(gateway.handle(&wire), Verdict::Accepted(reading));
//! ```

pub mod config;
pub mod core;
pub mod gateway;
pub mod producer;
pub mod sensor;
pub mod stats;
pub mod transport;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{AuthenticatedMessage, Reading, SharedKey, SignalWindow, Tag};
pub use gateway::{Gateway, RejectReason, Router, Verdict};
pub use producer::{Producer, ProducerConfig, PublishOutcome};
pub use sensor::{RawSample, SampleKind, SimulatedSensor};
pub use stats::{PipelineStats, SharedStats};
pub use transport::{Backoff, ConnectionState, Transport, TransportManager};

#[cfg(feature = "publisher")]
pub use transport::HttpTransport;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
