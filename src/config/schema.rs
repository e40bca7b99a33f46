//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::certs::fallback::{SNAKE_OIL_KEY, SNAKE_OIL_PEM};
use crate::queue::{ExponentialBackoff, FixedDelay, LinearBackoff, RateLimiter};
use crate::upstream::{DEFAULT_BACKEND_ADDRESS, DEFAULT_BACKEND_PORT};

/// Root configuration for the controller.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ControllerConfig {
    /// Work queue and retry settings.
    pub queue: QueueConfig,

    /// Fallback certificate location.
    pub tls: TlsConfig,

    /// Built-in default backend.
    pub default_backend: DefaultBackendConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Retry strategy for failed syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Exponential,
    Linear,
    Fixed,
}

/// Work queue configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Retry strategy.
    pub backoff: BackoffKind,

    /// First retry delay in milliseconds (step size for linear, delay for fixed).
    pub base_delay_ms: u64,

    /// Retry delay ceiling in milliseconds.
    pub max_delay_ms: u64,

    /// Delay before relaunching a worker that exited unexpectedly, in seconds.
    pub worker_restart_secs: u64,

    /// Interval at which every stored key is enqueued again, in seconds.
    pub resync_period_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffKind::Exponential,
            base_delay_ms: 5,
            max_delay_ms: 1_000_000,
            worker_restart_secs: 1,
            resync_period_secs: 30,
        }
    }
}

impl QueueConfig {
    /// Build the configured retry strategy.
    pub fn rate_limiter(&self) -> Box<dyn RateLimiter> {
        let base = Duration::from_millis(self.base_delay_ms);
        let max = Duration::from_millis(self.max_delay_ms);
        match self.backoff {
            BackoffKind::Exponential => Box::new(ExponentialBackoff::new(base, max)),
            BackoffKind::Linear => Box::new(LinearBackoff::new(base, max)),
            BackoffKind::Fixed => Box::new(FixedDelay::new(base)),
        }
    }

    pub fn worker_restart_period(&self) -> Duration {
        Duration::from_secs(self.worker_restart_secs)
    }

    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }
}

/// Fallback TLS credential paths.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub fallback_cert_path: String,

    /// Path to private key file (PEM).
    pub fallback_key_path: String,

    /// Names (CN/SANs) of the certificates available for selection, in order.
    pub certificate_names: Vec<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            fallback_cert_path: SNAKE_OIL_PEM.to_string(),
            fallback_key_path: SNAKE_OIL_KEY.to_string(),
            certificate_names: Vec::new(),
        }
    }
}

/// Default backend endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DefaultBackendConfig {
    pub address: String,
    pub port: String,
}

impl Default for DefaultBackendConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_BACKEND_ADDRESS.to_string(),
            port: DEFAULT_BACKEND_PORT.to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty for development, JSON for production.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
