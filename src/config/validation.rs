//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ControllerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ControllerConfig;
use crate::error::ValidationError;

/// Check semantic constraints serde cannot express.
pub fn validate_config(config: &ControllerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let queue = &config.queue;
    if queue.base_delay_ms == 0 {
        errors.push(ValidationError::ZeroBaseDelay);
    }
    if queue.max_delay_ms < queue.base_delay_ms {
        errors.push(ValidationError::MaxBelowBase {
            base: queue.base_delay_ms,
            max: queue.max_delay_ms,
        });
    }
    if queue.worker_restart_secs == 0 {
        errors.push(ValidationError::ZeroRestartPeriod);
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if config.default_backend.port.parse::<u16>().is_err() {
        errors.push(ValidationError::BackendPort(config.default_backend.port.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ControllerConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ControllerConfig::default();
        config.queue.base_delay_ms = 0;
        config.queue.worker_restart_secs = 0;
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "not-an-address".into();
        config.default_backend.port = "http".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroBaseDelay,
                ValidationError::ZeroRestartPeriod,
                ValidationError::MetricsAddress("not-an-address".into()),
                ValidationError::BackendPort("http".into()),
            ]
        );
    }

    #[test]
    fn test_max_below_base() {
        let mut config = ControllerConfig::default();
        config.queue.base_delay_ms = 500;
        config.queue.max_delay_ms = 100;

        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::MaxBelowBase { base: 500, max: 100 }]
        );
    }
}
