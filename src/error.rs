//! Error types used by the render pool, its facade and its configuration.
//!
//! - [`RenderError`]: failures of a single render task (what a caller awaits).
//! - [`PoolError`]: failures of the pool lifecycle itself (start, drain).
//! - [`ServiceError`]: what the [`RenderService`](crate::RenderService) facade returns.
//! - [`ConfigError`]: configuration loading and validation.
//!
//! Every enum provides `as_label` (stable snake_case label for logs/metrics).

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// # Errors produced by a single render task.
///
/// Exactly one of these (or the rendered bytes) is delivered to the caller of
/// [`RenderPool::submit`](crate::RenderPool::submit), exactly once.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Admission-time rejection: every unit is busy and the queue is at capacity.
    #[error("task queue is full ({capacity} pending)")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The render capability rejected the input or failed while composing.
    #[error("template failed: {message}")]
    Template {
        /// Message reported by the execution unit.
        message: String,
    },

    /// The task exceeded the configured per-task deadline.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// The execution unit died or its channel broke while the task was in flight.
    #[error("execution unit crashed: {reason}")]
    WorkerCrash {
        /// What the orchestrator observed.
        reason: String,
    },

    /// The pool is draining; the task was queued or in flight when shutdown began.
    #[error("render pool is shutting down")]
    ShuttingDown,

    /// The pool has not been initialized (or has already been shut down).
    #[error("render pool is not running")]
    NotRunning,
}

impl RenderError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use rendervisor::RenderError;
    ///
    /// let err = RenderError::QueueFull { capacity: 8 };
    /// assert_eq!(err.as_label(), "render_queue_full");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RenderError::QueueFull { .. } => "render_queue_full",
            RenderError::Template { .. } => "render_template_error",
            RenderError::Timeout { .. } => "render_timeout",
            RenderError::WorkerCrash { .. } => "render_worker_crash",
            RenderError::ShuttingDown => "render_shutting_down",
            RenderError::NotRunning => "render_not_running",
        }
    }

    /// Indicates whether a caller may reasonably retry the same request later.
    ///
    /// Only backpressure is retryable; the pool itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RenderError::QueueFull { .. })
    }
}

/// # Errors produced by the pool lifecycle.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Not every initial unit completed its readiness handshake in time.
    #[error("only {started}/{requested} execution units became ready within {timeout:?}")]
    StartupFailure {
        /// Units that did become ready.
        started: usize,
        /// Units requested by `worker_count`.
        requested: usize,
        /// The startup window.
        timeout: Duration,
    },

    /// The orchestrator is gone (never started, already shut down, or it exited).
    #[error("render pool is closed")]
    Closed,

    /// Shutdown did not finish within the grace period.
    #[error("shutdown grace {grace:?} exceeded; forcing exit")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
    },

    /// The supplied configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PoolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolError::StartupFailure { .. } => "pool_startup_failure",
            PoolError::Closed => "pool_closed",
            PoolError::GraceExceeded { .. } => "pool_grace_exceeded",
            PoolError::Config(_) => "pool_config",
        }
    }
}

/// Input rejected by a template's schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid input{}: {message}", path_suffix(.path))]
pub struct SchemaError {
    /// Dotted path of the offending field (`None` for the root value).
    pub path: Option<String>,
    /// What was wrong.
    pub message: String,
}

impl SchemaError {
    /// Error about the input as a whole.
    pub fn root(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }

    /// Error about a single field.
    pub fn field(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            message: message.into(),
        }
    }
}

fn path_suffix(path: &Option<String>) -> String {
    match path {
        Some(p) => format!(" at `{p}`"),
        None => String::new(),
    }
}

/// What kind of answer a front-end should give for a [`ServiceError`].
///
/// Callers never see unit ids or restart activity; they see one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Unknown template (404-style).
    NotFound,
    /// Backpressure; try again later (503-style).
    RetryLater,
    /// Input or template rejected the request (422-style).
    ClientInput,
    /// Anything else (500-style, opaque).
    Server,
}

/// # Errors returned by the [`RenderService`](crate::RenderService) facade.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// No template registered under this name.
    #[error("template `{name}` is not registered")]
    TemplateNotFound {
        /// Requested template name.
        name: String,
    },

    /// The input failed schema validation; no unit slot was consumed.
    #[error("template `{name}`: {source}")]
    InvalidInput {
        /// Template name.
        name: String,
        /// Validation failure.
        #[source]
        source: SchemaError,
    },

    /// The task was admitted (or rejected at admission) and failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The pool could not be started or is closed.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl ServiceError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::TemplateNotFound { .. } => "service_template_not_found",
            ServiceError::InvalidInput { .. } => "service_invalid_input",
            ServiceError::Render(e) => e.as_label(),
            ServiceError::Pool(e) => e.as_label(),
        }
    }

    /// Maps the error onto the user-visible answer class.
    ///
    /// ```
    /// use rendervisor::{ErrorClass, RenderError, ServiceError};
    ///
    /// let err = ServiceError::from(RenderError::QueueFull { capacity: 1 });
    /// assert_eq!(err.class(), ErrorClass::RetryLater);
    /// ```
    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::TemplateNotFound { .. } => ErrorClass::NotFound,
            ServiceError::InvalidInput { .. } => ErrorClass::ClientInput,
            ServiceError::Render(RenderError::QueueFull { .. }) => ErrorClass::RetryLater,
            ServiceError::Render(RenderError::Template { .. }) => ErrorClass::ClientInput,
            ServiceError::Render(_) | ServiceError::Pool(_) => ErrorClass::Server,
        }
    }
}

/// # Errors produced while loading or validating configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {reason}")]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// I/O error text.
        reason: String,
    },

    /// The TOML document is malformed or has unknown fields.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A field has a value the pool cannot work with.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "config_read",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_user_visible_classes() {
        let not_found = ServiceError::TemplateNotFound { name: "x".into() };
        assert_eq!(not_found.class(), ErrorClass::NotFound);

        let invalid = ServiceError::InvalidInput {
            name: "x".into(),
            source: SchemaError::field("width", "expected number"),
        };
        assert_eq!(invalid.class(), ErrorClass::ClientInput);

        let template = ServiceError::from(RenderError::Template {
            message: "bad color".into(),
        });
        assert_eq!(template.class(), ErrorClass::ClientInput);

        for err in [
            RenderError::Timeout {
                timeout: Duration::from_millis(50),
            },
            RenderError::WorkerCrash {
                reason: "exited".into(),
            },
            RenderError::ShuttingDown,
            RenderError::NotRunning,
        ] {
            assert_eq!(ServiceError::from(err).class(), ErrorClass::Server);
        }
        assert_eq!(
            ServiceError::from(PoolError::Closed).class(),
            ErrorClass::Server
        );
    }

    #[test]
    fn schema_error_display_includes_path() {
        let err = SchemaError::field("size.width", "expected number");
        assert_eq!(
            err.to_string(),
            "invalid input at `size.width`: expected number"
        );
        assert_eq!(
            SchemaError::root("expected object").to_string(),
            "invalid input: expected object"
        );
    }

    #[test]
    fn only_backpressure_is_retryable() {
        assert!(RenderError::QueueFull { capacity: 1 }.is_retryable());
        assert!(!RenderError::ShuttingDown.is_retryable());
        assert!(
            !RenderError::Template {
                message: "x".into()
            }
            .is_retryable()
        );
    }
}
