//! # Pool and service configuration.
//!
//! Provides [`PoolConfig`] (immutable once the pool starts) and [`ServiceConfig`]
//! (pool settings plus facade behavior), both deserializable from TOML.
//!
//! ```toml
//! auto_initialize = true
//! grace = "10s"
//!
//! [pool]
//! worker_count = 4
//! max_queue_size = 100
//! max_worker_errors = 3
//! task_timeout = "30s"
//! startup_timeout = "5s"
//! verbose = false
//! ```
//!
//! Durations use humantime notation (`"250ms"`, `"30s"`, `"1m"`).

use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::error::ConfigError;

/// Longest accepted `task_timeout` / `startup_timeout`.
///
/// Deadlines live on a timer wheel that cannot hold more than about 2^36 ms ahead.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Settings of one render pool.
///
/// ## Field semantics
/// - `worker_count`: number of execution units kept alive (min 1)
/// - `max_queue_size`: pending tasks allowed while every unit is busy (`0` = no queueing)
/// - `max_worker_errors`: lifetime task failures after which a unit is replaced (min 1)
/// - `task_timeout`: per-task deadline, measured from assignment to a unit
/// - `startup_timeout`: window for a new unit to report ready
///
/// Both timeouts must be non-zero and at most [`MAX_TIMEOUT`].
/// - `bus_capacity`: event bus ring buffer size (clamped to min 1)
/// - `verbose`: log per-task lifecycle at `INFO` instead of `DEBUG`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    pub worker_count: usize,
    pub max_queue_size: usize,
    pub max_worker_errors: u32,
    #[serde(with = "humantime_serde")]
    pub task_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub startup_timeout: Duration,
    pub bus_capacity: usize,
    pub verbose: bool,
}

impl PoolConfig {
    /// Checks the values the orchestrator relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid {
                field: "worker_count",
                reason: "must be at least 1",
            });
        }
        if self.max_worker_errors == 0 {
            return Err(ConfigError::Invalid {
                field: "max_worker_errors",
                reason: "must be at least 1",
            });
        }
        if self.task_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "task_timeout",
                reason: "must be greater than zero",
            });
        }
        if self.startup_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "startup_timeout",
                reason: "must be greater than zero",
            });
        }
        if self.task_timeout > MAX_TIMEOUT {
            return Err(ConfigError::Invalid {
                field: "task_timeout",
                reason: "must not exceed one year",
            });
        }
        if self.startup_timeout > MAX_TIMEOUT {
            return Err(ConfigError::Invalid {
                field: "startup_timeout",
                reason: "must not exceed one year",
            });
        }
        Ok(())
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for PoolConfig {
    /// Default configuration:
    ///
    /// - `worker_count = 4`
    /// - `max_queue_size = 100`
    /// - `max_worker_errors = 3`
    /// - `task_timeout = 30s`
    /// - `startup_timeout = 5s`
    /// - `bus_capacity = 1024`
    /// - `verbose = false`
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_queue_size: 100,
            max_worker_errors: 3,
            task_timeout: Duration::from_secs(30),
            startup_timeout: Duration::from_secs(5),
            bus_capacity: 1024,
            verbose: false,
        }
    }
}

/// Settings of the [`RenderService`](crate::RenderService) facade.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Pool settings.
    pub pool: PoolConfig,
    /// Start the pool on the first render call if it is not running yet.
    pub auto_initialize: bool,
    /// How long a signal-driven shutdown may take before the process gives up waiting.
    #[serde(with = "humantime_serde")]
    pub grace: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            auto_initialize: true,
            grace: Duration::from_secs(10),
        }
    }
}

impl ServiceConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.pool.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }
}
