//! Verification gateway for signed vitals.
//!
//! This module contains:
//! - The gateway's own canonical encoder
//! - Per-message verification producing a [`Verdict`]
//! - Accepted and rejected sinks, and the router between them

pub mod canonical;
pub mod router;
pub mod sink;
pub mod verifier;

// Re-export commonly used types
pub use router::Router;
pub use sink::{JsonlStore, MemorySink, ReadingSink, RejectLog, RejectSink, SinkError};
pub use verifier::{Gateway, RejectReason, Rejection, Verdict};
