//! Configuration surface exposed to the host process

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const SETTING_REQUEST_TIMEOUT_MS: &str = "dataplane.http.request.timeout.ms";
pub const SETTING_CONNECT_TIMEOUT_MS: &str = "dataplane.http.connect.timeout.ms";
pub const SETTING_MAX_ATTEMPTS: &str = "dataplane.http.retry.max.attempts";
pub const SETTING_BACKOFF_BASE_MS: &str = "dataplane.http.retry.backoff.base.ms";
pub const SETTING_BACKOFF_CAP_MS: &str = "dataplane.http.retry.backoff.cap.ms";
pub const SETTING_CHUNK_SIZE: &str = "dataplane.http.chunk.size";
pub const SETTING_SINK_QUEUE_CHUNKS: &str = "dataplane.http.sink.queue.chunks";

/// Tunables for HTTP transfers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Deadline for response headers (source) or the final response (sink)
    pub request_timeout: Duration,

    /// Deadline for establishing a TCP/TLS connection
    pub connect_timeout: Duration,

    /// Total attempts per transfer, including the first
    pub max_attempts: u32,

    /// Backoff before the first retry
    pub backoff_base: Duration,

    /// Upper bound for any single backoff
    pub backoff_cap: Duration,

    /// Bytes copied per read/write step
    pub chunk_size: usize,

    /// Chunks queued towards the sink connection before writes wait
    pub sink_queue_chunks: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_secs(30),
            chunk_size: 64 * 1024, // 64KB
            sink_queue_chunks: 8,
        }
    }
}

/// A setting that could not be applied
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub key: String,
    pub reason: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid setting '{}': {}", self.key, self.reason)
    }
}

impl std::error::Error for ConfigError {}

impl TransferConfig {
    /// Overlay named settings onto the defaults. Unknown keys are ignored.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = parse_setting::<u64>(settings, SETTING_REQUEST_TIMEOUT_MS)? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_setting::<u64>(settings, SETTING_CONNECT_TIMEOUT_MS)? {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_setting::<u32>(settings, SETTING_MAX_ATTEMPTS)? {
            config.max_attempts = attempts;
        }
        if let Some(ms) = parse_setting::<u64>(settings, SETTING_BACKOFF_BASE_MS)? {
            config.backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_setting::<u64>(settings, SETTING_BACKOFF_CAP_MS)? {
            config.backoff_cap = Duration::from_millis(ms);
        }
        if let Some(size) = parse_setting::<usize>(settings, SETTING_CHUNK_SIZE)? {
            config.chunk_size = size;
        }
        if let Some(chunks) = parse_setting::<usize>(settings, SETTING_SINK_QUEUE_CHUNKS)? {
            config.sink_queue_chunks = chunks;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(invalid(SETTING_MAX_ATTEMPTS, "at least one attempt is required"));
        }
        if self.chunk_size == 0 {
            return Err(invalid(SETTING_CHUNK_SIZE, "chunk size must be positive"));
        }
        if self.sink_queue_chunks == 0 {
            return Err(invalid(SETTING_SINK_QUEUE_CHUNKS, "queue must hold at least one chunk"));
        }
        if self.backoff_base > self.backoff_cap {
            return Err(invalid(
                SETTING_BACKOFF_BASE_MS,
                "backoff base must not exceed the backoff cap",
            ));
        }
        Ok(())
    }
}

fn parse_setting<T: std::str::FromStr>(
    settings: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match settings.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(key, &format!("cannot parse '{raw}'"))),
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.chunk_size, 65536);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_settings_overrides() {
        let config = TransferConfig::from_settings(&settings(&[
            (SETTING_MAX_ATTEMPTS, "5"),
            (SETTING_CHUNK_SIZE, "1024"),
            (SETTING_BACKOFF_BASE_MS, "50"),
            (SETTING_REQUEST_TIMEOUT_MS, " 2500 "),
            ("unrelated.key", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.backoff_base, Duration::from_millis(50));
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.backoff_cap, Duration::from_secs(30));
    }

    #[test]
    fn test_from_settings_rejects_garbage() {
        let err = TransferConfig::from_settings(&settings(&[(SETTING_CHUNK_SIZE, "lots")])).unwrap_err();
        assert_eq!(err.key, SETTING_CHUNK_SIZE);
        assert!(err.to_string().contains("lots"));
    }

    #[test]
    fn test_validation() {
        let err = TransferConfig::from_settings(&settings(&[(SETTING_MAX_ATTEMPTS, "0")])).unwrap_err();
        assert_eq!(err.key, SETTING_MAX_ATTEMPTS);

        let err = TransferConfig::from_settings(&settings(&[
            (SETTING_BACKOFF_BASE_MS, "5000"),
            (SETTING_BACKOFF_CAP_MS, "100"),
        ]))
        .unwrap_err();
        assert_eq!(err.key, SETTING_BACKOFF_BASE_MS);
    }

    #[test]
    fn test_serde_partial_document() {
        let config: TransferConfig = serde_json::from_str(r#"{"max_attempts": 4}"#).unwrap();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.chunk_size, TransferConfig::default().chunk_size);
    }
}
