use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::store::ReadRetryPolicy;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Where the database lives and how it is read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Primary copy. Always written first.
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,
    /// Secondary copy on shared storage. Best effort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<PathBuf>,
    /// Read attempts before a load gives up (default: 5)
    #[serde(default = "default_read_attempts")]
    pub read_attempts: u32,
    /// Linear backoff step between read attempts (default: 500)
    #[serde(default = "default_read_backoff_ms")]
    pub read_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
            remote_path: None,
            read_attempts: default_read_attempts(),
            read_backoff_ms: default_read_backoff_ms(),
        }
    }
}

impl StoreConfig {
    /// Local-only store at `local_path` with default read settings.
    pub fn new(local_path: impl Into<PathBuf>) -> Self {
        Self {
            local_path: local_path.into(),
            ..Default::default()
        }
    }

    pub fn with_remote(mut self, remote_path: impl Into<PathBuf>) -> Self {
        self.remote_path = Some(remote_path.into());
        self
    }

    pub fn with_read_retry(mut self, attempts: u32, backoff_ms: u64) -> Self {
        self.read_attempts = attempts;
        self.read_backoff_ms = backoff_ms;
        self
    }

    pub fn retry_policy(&self) -> ReadRetryPolicy {
        ReadRetryPolicy {
            attempts: self.read_attempts,
            backoff: Duration::from_millis(self.read_backoff_ms),
        }
    }
}

fn default_local_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("magnet-list-local.json")
}

fn default_read_attempts() -> u32 {
    5
}

fn default_read_backoff_ms() -> u64 {
    500
}

/// Settings handed to the submission collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Label applied to submitted torrents and used to list them back.
    #[serde(default)]
    pub label: String,
    /// Pause between retry-queue submissions (default: 1000)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            label: String::new(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl IngestConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_retry_delay_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[store]
local_path = "/home/me/magnets.json"
remote_path = "/mnt/nas/magnets.json"
read_attempts = 3
read_backoff_ms = 100

[ingest]
label = "audiobooks"
retry_delay_ms = 0
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.store.local_path, PathBuf::from("/home/me/magnets.json"));
        assert_eq!(
            config.store.remote_path,
            Some(PathBuf::from("/mnt/nas/magnets.json"))
        );
        assert_eq!(
            config.store.retry_policy(),
            ReadRetryPolicy {
                attempts: 3,
                backoff: Duration::from_millis(100),
            }
        );
        assert_eq!(config.ingest.label, "audiobooks");
        assert_eq!(config.ingest.retry_delay(), Duration::ZERO);
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.store.local_path.ends_with("magnet-list-local.json"));
        assert!(config.store.remote_path.is_none());
        assert_eq!(config.store.retry_policy(), ReadRetryPolicy::default());
        assert_eq!(config.ingest.label, "");
        assert_eq!(config.ingest.retry_delay_ms, 1000);
    }

    #[test]
    fn test_store_config_builders() {
        let store = StoreConfig::new("/tmp/local.json")
            .with_remote("/tmp/remote.json")
            .with_read_retry(1, 0);
        assert_eq!(store.local_path, PathBuf::from("/tmp/local.json"));
        assert_eq!(store.remote_path, Some(PathBuf::from("/tmp/remote.json")));
        assert_eq!(store.read_attempts, 1);
    }
}
