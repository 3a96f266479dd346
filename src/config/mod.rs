//! Engine configuration.
//!
//! Everything has a default, so an empty JSON object is a valid config:
//!
//! ```json
//! {
//!   "policy": { "max_age": "one_hour", "retry_count": 3, "initial_retry_delay_ms": 1000 },
//!   "transport": { "timeout_ms": 30000, "max_response_bytes": 8388608 }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::policy::{CachePolicy, MaxAge};

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Default per-request origin timeout (30 s).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest origin response buffered before giving up (8 MiB).
const DEFAULT_MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

/// Limits for the bundled [`Http1Transport`](crate::transport::Http1Transport).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Upper bound on one request/response exchange.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    pub max_response_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

/// Top-level configuration for a [`CacheOrchestrator`](crate::CacheOrchestrator).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rcache::config::CacheConfig;
/// use rcache::policy::MaxAge;
///
/// let config = CacheConfig::default()
///     .with_max_age(MaxAge::Minutes(5.0))
///     .with_retry(2, Duration::from_millis(200));
///
/// assert_eq!(config.policy.max_age(), MaxAge::Minutes(5.0));
/// assert_eq!(config.policy.retry_count(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Policy applied when no per-request resolver answers.
    pub policy: CachePolicy,
    pub transport: TransportConfig,
}

impl CacheConfig {
    /// Parses a JSON config document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed JSON or unknown enum values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
    /// if its contents are invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Replaces the global policy.
    #[must_use]
    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the global max age, keeping the retry budget.
    #[must_use]
    pub fn with_max_age(mut self, max_age: MaxAge) -> Self {
        self.policy = CachePolicy::with_retry(
            max_age,
            self.policy.retry_count(),
            self.policy.initial_retry_delay(),
        );
        self
    }

    /// Replaces the global retry budget, keeping the max age.
    #[must_use]
    pub fn with_retry(mut self, retry_count: u32, initial_retry_delay: Duration) -> Self {
        self.policy =
            CachePolicy::with_retry(self.policy.max_age(), retry_count, initial_retry_delay);
        self
    }

    /// Replaces the transport limits.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }
}

/// Serde adapter for durations written as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
