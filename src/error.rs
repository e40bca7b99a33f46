//! Error types shared across the crate.

use thiserror::Error;

/// Error returned by a sync callback. Never propagated past the worker.
pub type SyncError = Box<dyn std::error::Error + Send + Sync>;

/// Failure to derive a queue key from a watched object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("object has no name")]
    MissingName,

    #[error("unexpected key format: {0:?}")]
    UnexpectedFormat(String),
}

/// Malformed `namespace/name` string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NsNameError {
    #[error("invalid format (namespace/name) found in '{0}'")]
    InvalidFormat(String),
}

/// A single semantic problem in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("queue.base_delay_ms must be greater than zero")]
    ZeroBaseDelay,

    #[error("queue.max_delay_ms ({max}) must not be below queue.base_delay_ms ({base})")]
    MaxBelowBase { base: u64, max: u64 },

    #[error("queue.worker_restart_secs must be greater than zero")]
    ZeroRestartPeriod,

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("default_backend.port '{0}' is not a valid port")]
    BackendPort(String),
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
