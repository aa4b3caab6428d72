use crate::env::{self, defaults};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the task queue orders pending requests
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueOrdering {
    /// Strict arrival order; priority is informational only
    #[default]
    Fifo,
    /// Highest priority first, arrival order within a priority
    Priority,
}

/// Static configuration for the sync coordinator
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Scheduler loop tick interval in milliseconds
    pub tick_interval_ms: u64,

    /// Number of workers; defaults to host parallelism when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_count: Option<usize>,

    /// Timeout for one handler invocation, overridden by the persisted setting
    pub max_sync_duration_minutes: u32,

    /// Capacity of the error ring buffer
    pub max_error_history: usize,

    /// Sleep after an unexpected scheduler loop fault, in milliseconds
    pub loop_error_backoff_ms: u64,

    pub queue_ordering: QueueOrdering,

    /// File-backed settings store; in-memory settings are used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: defaults::TICK_INTERVAL_MS,
            worker_count: None,
            max_sync_duration_minutes: defaults::MAX_SYNC_DURATION_MINUTES,
            max_error_history: env::MAX_ERROR_HISTORY,
            loop_error_backoff_ms: defaults::LOOP_ERROR_BACKOFF_MS,
            queue_ordering: QueueOrdering::default(),
            settings_path: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn loop_error_backoff(&self) -> Duration {
        Duration::from_millis(self.loop_error_backoff_ms)
    }

    pub fn max_sync_duration(&self) -> Duration {
        Duration::from_secs(self.max_sync_duration_minutes as u64 * 60)
    }

    /// Worker count after applying the host-parallelism default
    pub fn effective_worker_count(&self) -> usize {
        self.worker_count
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_string()?;
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Convert configuration to a TOML string
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}
