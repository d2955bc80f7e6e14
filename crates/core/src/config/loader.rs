use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::{Path, PathBuf};

use super::{types::Config, ConfigError};

/// Environment variable prefix; nested keys are separated by `__`
/// (e.g. `MAGNETDB_STORE__REMOTE_PATH`).
const ENV_PREFIX: &str = "MAGNETDB_";

/// Default configuration file location (`<config dir>/magnetdb/config.toml`).
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("magnetdb")
        .join("config.toml")
}

fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    figment(path)
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Like [`load_config`], but a missing file means defaults plus environment.
pub fn load_config_or_default(path: &Path) -> Result<Config, ConfigError> {
    figment(path)
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[store]
local_path = "/tmp/local.json"

[ingest]
label = "books"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.store.local_path, PathBuf::from("/tmp/local.json"));
        assert_eq!(config.ingest.label, "books");
    }

    #[test]
    fn test_load_config_from_str_wrong_type() {
        let toml = r#"
[store]
read_attempts = "many"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/magnetdb.toml"));
        assert!(matches!(result.unwrap_err(), ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_or_default_missing_file() {
        let config = load_config_or_default(Path::new("/nonexistent/magnetdb.toml")).unwrap();
        assert_eq!(config.store.read_attempts, 5);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[store]
local_path = "/srv/magnets/local.json"
remote_path = "/mnt/share/magnets.json"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(
            config.store.remote_path,
            Some(PathBuf::from("/mnt/share/magnets.json"))
        );
    }
}
