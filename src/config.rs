//! Configuration for the coordinator and worker processes.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Coordinator-side configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Public API endpoint clients connect to.
    pub public_bind: SocketAddr,
    /// Registry endpoint workers register with.
    pub registry_bind: SocketAddr,
    /// Liveness poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for a free worker. Absent means the acquire
    /// blocks indefinitely, the historical backpressure behavior.
    pub acquire_timeout_ms: Option<u64>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            public_bind: ([127, 0, 0, 1], 7411).into(),
            registry_bind: ([127, 0, 0, 1], 7412).into(),
            poll_interval_ms: 5_000,
            acquire_timeout_ms: None,
        }
    }
}

impl ClusterConfig {
    /// Loads the configuration from a TOML file; absent keys fall back to
    /// the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        parse_toml(path)
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Acquire timeout as a duration, if bounded.
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

/// Worker-side configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Address the worker's operation endpoint binds to. Port 0 picks an
    /// ephemeral port, which the worker advertises at registration.
    pub bind: SocketAddr,
    /// Base URL of the coordinator's registry endpoint.
    pub registry_url: String,
    /// Consume the obsolete-id pool before advancing the counter.
    pub recycle_ids: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind: ([127, 0, 0, 1], 0).into(),
            registry_url: "http://127.0.0.1:7412".to_string(),
            recycle_ids: false,
        }
    }
}

impl WorkerConfig {
    /// Loads the configuration from a TOML file; absent keys fall back to
    /// the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        parse_toml(path)
    }
}

fn parse_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        GraphError::invalid_argument(format!("config {}: {err}", path.display()))
    })?;
    toml::from_str(&text).map_err(|err| {
        GraphError::invalid_argument(format!("config {}: {err}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_ms = 250").unwrap();
        let config = ClusterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.acquire_timeout(), None);
        assert_eq!(config.public_bind, ClusterConfig::default().public_bind);
    }

    #[test]
    fn malformed_config_is_a_caller_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_ms = \"soon\"").unwrap();
        let err = ClusterConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument { .. }));
    }
}
