//! Publish-side connection management.
//!
//! The [`TransportManager`] is the only owner of the live connection. It
//! tracks [`ConnectionState`], reconnects on a monotonic-clock schedule with
//! capped exponential backoff, and never blocks a caller on a dead link:
//! while disconnected, `publish` fails immediately.

#[cfg(feature = "publisher")]
pub mod http;

#[cfg(feature = "publisher")]
pub use http::HttpTransport;

use std::fmt;
use std::time::{Duration, Instant};

/// Transport collaborator errors.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Connection could not be established
    Connect(String),
    /// Network failure while talking to the peer
    Network(String),
    /// Peer answered but refused the publish
    Refused { status: u16, message: String },
    /// Operation requires a live connection
    NotConnected,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Connect(msg) => write!(f, "Connect failed: {msg}"),
            TransportError::Network(msg) => write!(f, "Network error: {msg}"),
            TransportError::Refused { status, message } => {
                write!(f, "Publish refused ({status}): {message}")
            }
            TransportError::NotConnected => write!(f, "Not connected"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Why a publish did not go out.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishError {
    /// Not connected; nothing was attempted
    Disconnected,
    /// Connected, but the publish call itself failed
    Failed(TransportError),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Disconnected => write!(f, "Transport disconnected"),
            PublishError::Failed(e) => write!(f, "Publish failed: {e}"),
        }
    }
}

impl std::error::Error for PublishError {}

/// A publish/subscribe link, as seen by the manager.
///
/// Implementations bound their own connect and publish timeouts.
pub trait Transport {
    /// Establish the connection.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Whether the link is believed to be up. Reports unsolicited drops.
    fn is_connected(&self) -> bool;

    /// Send one payload on a topic.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Tear the connection down.
    fn disconnect(&mut self);
}

/// Publish-side connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Capped exponential backoff between reconnect attempts.
///
/// With `initial == max` this is the fixed-delay retry.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait before the next attempt; grows for the one after.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

/// Owns a [`Transport`] and drives its connection lifecycle.
pub struct TransportManager<T: Transport> {
    transport: T,
    state: ConnectionState,
    backoff: Backoff,
    next_attempt: Option<Instant>,
    attempts: u64,
    consecutive_failures: u32,
}

impl<T: Transport> TransportManager<T> {
    /// Wrap a transport. The first `tick` attempts to connect.
    pub fn new(transport: T, backoff: Backoff) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            backoff,
            next_attempt: None,
            attempts: 0,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Total connect attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Failed connect attempts since the last successful connect.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Earliest time the next reconnect may be attempted; `None` means now.
    pub fn next_attempt(&self) -> Option<Instant> {
        self.next_attempt
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Connect now, ignoring the retry schedule.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        self.attempt_at(Instant::now())
    }

    /// Advance the state machine using the current time.
    pub fn tick(&mut self) -> ConnectionState {
        self.tick_at(Instant::now())
    }

    /// Advance the state machine as of `now`.
    ///
    /// Detects unsolicited drops and, when not connected and the retry
    /// deadline has passed, makes one reconnect attempt.
    pub fn tick_at(&mut self, now: Instant) -> ConnectionState {
        if self.state == ConnectionState::Connected && !self.transport.is_connected() {
            tracing::warn!("Connection lost");
            self.mark_lost();
        }

        let due = self.next_attempt.map_or(true, |at| now >= at);
        if self.state != ConnectionState::Connected && due {
            let _ = self.attempt_at(now);
        }

        self.state
    }

    /// Publish one payload, single attempt.
    ///
    /// Fails immediately when disconnected. A failed publish drops the
    /// connection so the next tick reconnects.
    pub fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        if self.state != ConnectionState::Connected || !self.transport.is_connected() {
            if self.state == ConnectionState::Connected {
                self.mark_lost();
            }
            return Err(PublishError::Disconnected);
        }

        match self.transport.publish(topic, payload) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(topic, error = %e, "Publish failed");
                self.mark_lost();
                Err(PublishError::Failed(e))
            }
        }
    }

    /// Drop the connection on request.
    pub fn disconnect(&mut self) {
        self.transport.disconnect();
        self.state = ConnectionState::Disconnected;
    }

    fn attempt_at(&mut self, now: Instant) -> Result<(), TransportError> {
        self.state = ConnectionState::Connecting;
        self.attempts += 1;
        tracing::debug!(attempt = self.attempts, "Connecting");

        match self.transport.connect() {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.consecutive_failures = 0;
                self.backoff.reset();
                tracing::info!(attempt = self.attempts, "Connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                let delay = self.backoff.next_delay();
                self.next_attempt = Some(now + delay);
                tracing::warn!(
                    attempt = self.attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Connect failed"
                );
                Err(e)
            }
        }
    }

    fn mark_lost(&mut self) {
        self.transport.disconnect();
        self.state = ConnectionState::Disconnected;
        // First reconnect after a drop is immediate; failures then back off.
        self.next_attempt = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted transport for exercising the manager.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub connect_results: VecDeque<Result<(), TransportError>>,
        pub publish_results: VecDeque<Result<(), TransportError>>,
        pub connected: bool,
        pub connect_calls: u32,
        pub published: Vec<(String, Vec<u8>)>,
        /// Result used once the scripted queues run dry
        pub broker_up: bool,
    }

    impl Transport for ScriptedTransport {
        fn connect(&mut self) -> Result<(), TransportError> {
            self.connect_calls += 1;
            let result = self.connect_results.pop_front().unwrap_or(if self.broker_up {
                Ok(())
            } else {
                Err(TransportError::Connect("refused".to_string()))
            });
            self.connected = result.is_ok();
            result
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
            let result = self.publish_results.pop_front().unwrap_or(if self.broker_up {
                Ok(())
            } else {
                Err(TransportError::Network("reset".to_string()))
            });
            if result.is_ok() {
                self.published.push((topic.to_string(), payload.to_vec()));
            }
            result
        }

        fn disconnect(&mut self) {
            self.connected = false;
        }
    }

    fn backoff() -> Backoff {
        Backoff::new(Duration::from_millis(100), Duration::from_millis(800))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = backoff();
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 800, 800]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_fixed_backoff() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_first_tick_connects() {
        let transport = ScriptedTransport {
            broker_up: true,
            ..Default::default()
        };
        let mut manager = TransportManager::new(transport, backoff());
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        assert_eq!(manager.tick(), ConnectionState::Connected);
        assert!(manager.publish("vitals/readings", b"{}").is_ok());
        assert_eq!(manager.transport().published.len(), 1);
    }

    #[test]
    fn test_publish_while_disconnected_fails_immediately() {
        let mut manager = TransportManager::new(ScriptedTransport::default(), backoff());
        assert_eq!(
            manager.publish("vitals/readings", b"{}"),
            Err(PublishError::Disconnected)
        );
        assert_eq!(manager.transport().connect_calls, 0);
    }

    #[test]
    fn test_retries_are_time_gated() {
        let start = Instant::now();
        let mut manager = TransportManager::new(ScriptedTransport::default(), backoff());

        manager.tick_at(start);
        assert_eq!(manager.attempts(), 1);

        // Within the 100ms backoff: no new attempt.
        manager.tick_at(start + Duration::from_millis(50));
        assert_eq!(manager.attempts(), 1);

        manager.tick_at(start + Duration::from_millis(100));
        assert_eq!(manager.attempts(), 2);

        // Next delay is 200ms from the second attempt.
        manager.tick_at(start + Duration::from_millis(250));
        assert_eq!(manager.attempts(), 2);
        manager.tick_at(start + Duration::from_millis(300));
        assert_eq!(manager.attempts(), 3);
    }

    #[test]
    fn test_never_gives_up_reconnecting() {
        let start = Instant::now();
        let mut manager = TransportManager::new(ScriptedTransport::default(), backoff());

        for i in 0..50u64 {
            let now = start + Duration::from_secs(i);
            assert_ne!(manager.tick_at(now), ConnectionState::Connected);
            assert_eq!(
                manager.publish("vitals/readings", b"{}"),
                Err(PublishError::Disconnected)
            );
        }
        assert_eq!(manager.attempts(), 50);
        assert_eq!(manager.consecutive_failures(), 50);

        // Broker comes back: the very next eligible tick connects.
        manager.transport.broker_up = true;
        assert_eq!(
            manager.tick_at(start + Duration::from_secs(60)),
            ConnectionState::Connected
        );
        assert_eq!(manager.consecutive_failures(), 0);
    }

    #[test]
    fn test_publish_failure_drops_connection() {
        let mut transport = ScriptedTransport {
            broker_up: true,
            ..Default::default()
        };
        transport
            .publish_results
            .push_back(Err(TransportError::Network("broken pipe".to_string())));
        let mut manager = TransportManager::new(transport, backoff());
        manager.tick();

        let result = manager.publish("vitals/readings", b"{}");
        assert!(matches!(result, Err(PublishError::Failed(TransportError::Network(_)))));
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        // Reconnect is attempted right away, then publishing resumes.
        assert_eq!(manager.tick(), ConnectionState::Connected);
        assert!(manager.publish("vitals/readings", b"{}").is_ok());
    }

    #[test]
    fn test_unsolicited_disconnect_detected() {
        let transport = ScriptedTransport {
            broker_up: true,
            ..Default::default()
        };
        let mut manager = TransportManager::new(transport, backoff());
        manager.tick();
        assert!(manager.is_connected());

        manager.transport.connected = false;
        assert_eq!(
            manager.publish("vitals/readings", b"{}"),
            Err(PublishError::Disconnected)
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.tick(), ConnectionState::Connected);
    }

    #[test]
    fn test_backoff_resets_after_success() {
        let start = Instant::now();
        let mut transport = ScriptedTransport::default();
        transport.connect_results.extend([
            Err(TransportError::Connect("a".into())),
            Err(TransportError::Connect("b".into())),
            Ok(()),
        ]);
        let mut manager = TransportManager::new(transport, backoff());

        manager.tick_at(start);
        manager.tick_at(start + Duration::from_millis(100));
        assert_eq!(
            manager.tick_at(start + Duration::from_millis(300)),
            ConnectionState::Connected
        );

        // Drop and fail again: delay is back to the initial 100ms.
        manager.transport.connected = false;
        let later = start + Duration::from_secs(1);
        manager.tick_at(later);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(
            manager.next_attempt(),
            Some(later + Duration::from_millis(100))
        );
    }
}
