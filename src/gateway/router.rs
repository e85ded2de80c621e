//! Routes verdicts to the accepted and rejected channels.

use crate::gateway::sink::{ReadingSink, RejectSink};
use crate::gateway::verifier::{Gateway, RejectReason, Verdict};
use crate::stats::SharedStats;
use std::sync::Arc;

/// Verifies inbound messages and hands each verdict to exactly one sink.
#[derive(Clone)]
pub struct Router {
    gateway: Gateway,
    accepted: Arc<dyn ReadingSink>,
    rejected: Arc<dyn RejectSink>,
    stats: Option<SharedStats>,
}

impl Router {
    pub fn new(
        gateway: Gateway,
        accepted: Arc<dyn ReadingSink>,
        rejected: Arc<dyn RejectSink>,
    ) -> Self {
        Self {
            gateway,
            accepted,
            rejected,
            stats: None,
        }
    }

    /// Count verdicts in `stats`.
    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Verify one message and route the verdict.
    ///
    /// Sink failures are logged; they do not change the verdict.
    pub fn dispatch(&self, inbound: &[u8]) -> Verdict {
        let verdict = self.gateway.handle(inbound);

        match &verdict {
            Verdict::Accepted(reading) => {
                if let Some(ref stats) = self.stats {
                    stats.record_accepted();
                }
                tracing::info!(
                    temp_c = reading.temp_c(),
                    bpm = reading.bpm(),
                    avg_bpm = reading.avg_bpm(),
                    "Accepted reading"
                );
                if let Err(e) = self.accepted.accept(reading) {
                    tracing::error!("Failed to store accepted reading: {e}");
                }
            }
            Verdict::Rejected(rejection) => {
                if let Some(ref stats) = self.stats {
                    match rejection.reason {
                        RejectReason::MalformedPayload => stats.record_malformed(),
                        RejectReason::TagMismatch => stats.record_mismatch(),
                    }
                }
                if let Err(e) = self.rejected.reject(rejection, inbound) {
                    tracing::error!("Failed to record rejection: {e}");
                }
            }
        }

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mac::SharedKey;
    use crate::core::message::AuthenticatedMessage;
    use crate::core::reading::Reading;
    use crate::gateway::sink::MemorySink;
    use crate::stats::create_shared_stats;

    #[test]
    fn test_dispatch_routes_each_verdict_once() {
        let key = Arc::new(SharedKey::from_bytes(b"router test shared key!!").unwrap());
        let sink = Arc::new(MemorySink::new());
        let stats = create_shared_stats();
        let router = Router::new(Gateway::new(key.clone()), sink.clone(), sink.clone())
            .with_stats(stats.clone());

        let reading = Reading::new(36.7, 68.2, 67).unwrap();
        let wire = AuthenticatedMessage::sign(&key, reading).to_wire();
        let mut tampered = wire.clone();
        let idx = tampered.len() - 3;
        tampered[idx] = if tampered[idx] == b'a' { b'b' } else { b'a' };

        assert!(router.dispatch(&wire).is_accepted());
        assert_eq!(
            router.dispatch(&tampered).reason(),
            Some(RejectReason::TagMismatch)
        );
        assert_eq!(
            router.dispatch(b"{").reason(),
            Some(RejectReason::MalformedPayload)
        );

        assert_eq!(sink.accepted(), vec![reading]);
        assert_eq!(sink.rejected().len(), 2);

        let s = stats.snapshot();
        assert_eq!((s.accepted, s.mismatched, s.malformed), (1, 1, 1));
    }
}
