//! Configuration for the restart orchestrator

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default budget for a single node call
const DEFAULT_CALL_TIMEOUT_MS: u64 = 20_000;

/// Tunables of one orchestrator instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Budget for each node's sync check, in milliseconds
    pub sync_timeout_ms: u64,

    /// Budget for each node's restart, in milliseconds
    pub restart_timeout_ms: u64,

    /// Events buffered per subscriber before the oldest are dropped
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            sync_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            restart_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            event_capacity: 100,
        }
    }
}

impl OrchestratorConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| OrchestratorError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| OrchestratorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_restart_timeout(mut self, timeout: Duration) -> Self {
        self.restart_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_millis(self.restart_timeout_ms)
    }

    /// Reject values that would make a phase never start or never finish
    pub fn validate(&self) -> Result<()> {
        if self.sync_timeout_ms == 0 {
            return Err(OrchestratorError::Config("sync_timeout_ms must be > 0".into()));
        }
        if self.restart_timeout_ms == 0 {
            return Err(OrchestratorError::Config("restart_timeout_ms must be > 0".into()));
        }
        if self.event_capacity == 0 {
            return Err(OrchestratorError::Config("event_capacity must be > 0".into()));
        }
        Ok(())
    }
}
