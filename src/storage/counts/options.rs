use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::codec::FormatVersion;
use crate::primitives::concurrency::DEFAULT_POLL_INTERVAL;
use crate::types::{Result, SombraError};

/// Tunables for a [`VersionedCountsStore`](super::VersionedCountsStore).
///
/// Deserializes from TOML with every field optional:
///
/// ```toml
/// wait_poll_interval_ms = 5
/// default_snapshot_timeout_ms = 2000
/// format_version = "v2"
/// initial_capacity = 4096
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CountsOptions {
    /// Upper bound on one parked step while waiting for a transaction, in milliseconds.
    pub wait_poll_interval_ms: u64,
    /// Budget used by `snapshot_with_default_timeout`, in milliseconds.
    pub default_snapshot_timeout_ms: u64,
    /// Key scheme used by [`VersionedCountsStore::checkpoint`](super::VersionedCountsStore::checkpoint)
    /// and by `open_or_rebuild` when it rewrites the file.
    pub format_version: FormatVersion,
    /// Number of keys to reserve room for up front.
    pub initial_capacity: usize,
}

impl Default for CountsOptions {
    fn default() -> Self {
        Self {
            wait_poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            default_snapshot_timeout_ms: 10_000,
            format_version: FormatVersion::default(),
            initial_capacity: 0,
        }
    }
}

impl CountsOptions {
    /// Parses options from a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|err| SombraError::Config(err.to_string()))
    }

    /// Reads options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
            .map_err(|err| SombraError::Config(format!("{}: {err}", path.display())))
    }

    /// Wait step as a [`Duration`].
    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms)
    }

    /// Default snapshot budget as a [`Duration`].
    pub fn default_snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.default_snapshot_timeout_ms)
    }

    /// Sets the wait step.
    pub fn with_wait_poll_interval(mut self, interval: Duration) -> Self {
        self.wait_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the default snapshot budget.
    pub fn with_default_snapshot_timeout(mut self, timeout: Duration) -> Self {
        self.default_snapshot_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the key scheme.
    pub fn with_format_version(mut self, format: FormatVersion) -> Self {
        self.format_version = format;
        self
    }

    /// Sets the initial key capacity.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}
