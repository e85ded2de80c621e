//! Configuration for signed-vitals.

use crate::core::window::SignalWindow;
use crate::producer::{ProducerConfig, DEFAULT_TOPIC};
use crate::transport::Backoff;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration shared by the producer and the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shared key file (hex text or raw bytes). The key environment
    /// variable takes precedence.
    pub key_path: Option<PathBuf>,

    /// Gateway endpoint the producer publishes to
    pub endpoint: String,

    /// Port the gateway listens on
    pub listen_port: u16,

    /// Topic readings are published on
    pub topic: String,

    /// Time between publishes
    #[serde(with = "duration_serde")]
    pub publish_interval: Duration,

    /// First reconnect delay in milliseconds
    pub reconnect_initial_ms: u64,

    /// Reconnect delay cap in milliseconds
    pub reconnect_max_ms: u64,

    /// Number of slots in the beat-rate window
    pub window_size: usize,

    /// Plausible beat rates, inclusive
    pub bpm_min: f64,
    pub bpm_max: f64,

    /// Plausible thermometer temperatures in Celsius, inclusive
    pub temp_min_c: f64,
    pub temp_max_c: f64,

    /// Path for stats, accepted readings and the reject log
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("signed-vitals");

        Self {
            key_path: None,
            endpoint: "http://127.0.0.1:7878".to_string(),
            listen_port: 7878,
            topic: DEFAULT_TOPIC.to_string(),
            publish_interval: Duration::from_secs(5),
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 30_000,
            window_size: 8,
            bpm_min: 20.0,
            bpm_max: 255.0,
            temp_min_c: -55.0,
            temp_max_c: 125.0,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            serde_json::from_str::<Config>(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("signed-vitals")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::Invalid("window_size must be at least 1".into()));
        }
        if !(self.bpm_min < self.bpm_max) {
            return Err(ConfigError::Invalid("bpm_min must be below bpm_max".into()));
        }
        if !(self.temp_min_c < self.temp_max_c) {
            return Err(ConfigError::Invalid("temp_min_c must be below temp_max_c".into()));
        }
        if self.publish_interval.is_zero() {
            return Err(ConfigError::Invalid("publish_interval must be positive".into()));
        }
        if self.reconnect_initial_ms == 0 {
            return Err(ConfigError::Invalid("reconnect_initial_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.reconnect_initial_ms),
            Duration::from_millis(self.reconnect_max_ms),
        )
    }

    pub fn window(&self) -> SignalWindow {
        SignalWindow::new(self.window_size, self.bpm_min..=self.bpm_max)
    }

    pub fn producer(&self) -> ProducerConfig {
        ProducerConfig {
            topic: self.topic.clone(),
            publish_interval: self.publish_interval,
            temp_range: self.temp_min_c..=self.temp_max_c,
        }
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }

    pub fn accepted_path(&self) -> PathBuf {
        self.data_path.join("accepted.jsonl")
    }

    pub fn rejected_path(&self) -> PathBuf {
        self.data_path.join("rejected.jsonl")
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.publish_interval, Duration::from_secs(5));
        assert_eq!(config.topic, "vitals/readings");
        assert_eq!(config.listen_port, 7878);
        assert!(config.key_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"window_size": 4, "publish_interval": 2}"#).unwrap();
        assert_eq!(config.window_size, 4);
        assert_eq!(config.publish_interval, Duration::from_secs(2));
        assert_eq!(config.reconnect_max_ms, 30_000);
        assert_eq!(config.window().capacity(), 4);
    }

    #[test]
    fn test_validation() {
        let mut config = Config {
            window_size: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.window_size = 8;
        config.bpm_min = 300.0;
        assert!(config.validate().is_err());

        config.bpm_min = 20.0;
        config.publish_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_settings() {
        let config = Config::default();
        let producer = config.producer();
        assert!(producer.temp_range.contains(&36.6));
        assert!(!producer.temp_range.contains(&-127.0));

        let window = config.window();
        assert!(window.accepts(20.0));
        assert!(window.accepts(255.0));
        assert!(!window.accepts(256.0));

        let mut backoff = config.backoff();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }
}
