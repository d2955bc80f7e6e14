use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - At least one read attempt
/// - Local path is set
/// - Remote path, when set, is not the local path
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let store = &config.store;

    if store.read_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "store.read_attempts cannot be 0".to_string(),
        ));
    }

    if store.local_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "store.local_path cannot be empty".to_string(),
        ));
    }

    if let Some(remote) = &store.remote_path {
        if remote.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "store.remote_path cannot be empty when set".to_string(),
            ));
        }
        if *remote == store.local_path {
            return Err(ConfigError::ValidationError(
                "store.remote_path must differ from store.local_path".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn config_with(store: StoreConfig) -> Config {
        Config {
            store,
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_valid_config() {
        let config = config_with(StoreConfig::new("/data/local.json").with_remote("/nas/db.json"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_attempts_fails() {
        let config = config_with(StoreConfig::new("/data/local.json").with_read_retry(0, 500));
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_empty_local_path_fails() {
        let config = config_with(StoreConfig::new(""));
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_remote_equal_to_local_fails() {
        let config = config_with(StoreConfig::new("/data/db.json").with_remote("/data/db.json"));
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("remote_path"));
    }
}
