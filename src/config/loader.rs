//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ControllerConfig;
use crate::config::validation::validate_config;
use crate::error::ConfigError;

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ControllerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ControllerConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn write_config(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("ingress-sync-{}.toml", Uuid::new_v4()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_valid_file() {
        let path = write_config("[queue]\nbase_delay_ms = 20\nmax_delay_ms = 2000\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.queue.base_delay_ms, 20);
        assert_eq!(config.queue.max_delay_ms, 2000);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_load_reports_each_failure_kind() {
        let missing = std::env::temp_dir().join(format!("missing-{}.toml", Uuid::new_v4()));
        assert!(matches!(load_config(&missing), Err(ConfigError::Io(_))));

        let garbled = write_config("[queue\n");
        assert!(matches!(load_config(&garbled), Err(ConfigError::Parse(_))));
        fs::remove_file(garbled).unwrap();

        let invalid = write_config("[queue]\nbase_delay_ms = 0\n");
        match load_config(&invalid) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation error, got {other:?}"),
        }
        fs::remove_file(invalid).unwrap();
    }
}
