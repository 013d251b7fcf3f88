use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::types::Config;

/// Environment variable naming the configuration file read by [`Config::load`].
pub const CONFIG_ENV: &str = "UNISTORE_CONFIG";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl Config {
    /// Loads configuration from the file named by `UNISTORE_CONFIG`.
    ///
    /// Returns `Config::default()` when the variable is unset.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from(PathBuf::from(path)),
            None => Ok(Config::default()),
        }
    }

    /// Loads configuration from `path`.
    ///
    /// - If the file doesn't exist, returns `Config::default()`.
    /// - If the file exists, parses it as TOML and validates.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Checks:
    /// - The diagnostics history keeps at least one entry
    /// - The logging filter is not blank
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.diagnostics.history == 0 {
            return Err(ConfigError::ValidationError {
                message: "diagnostics.history must be at least 1".to_string(),
            });
        }

        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "logging.filter must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticMode;
    use std::io::Write;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.store.thread_checks);
        assert_eq!(config.diagnostics.history, 64);
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [store]
            thread_checks = false

            [diagnostics]
            mode = "strict"
            history = 8

            [logging]
            filter = "unistore=debug"
            file = "/tmp/unistore.log"
            "#,
        )
        .unwrap();
        assert!(!config.store.thread_checks);
        assert_eq!(config.diagnostics.mode, DiagnosticMode::Strict);
        assert_eq!(config.diagnostics.history, 8);
        assert_eq!(config.logging.filter, "unistore=debug");
        assert_eq!(
            config.logging.file.as_deref(),
            Some(Path::new("/tmp/unistore.log"))
        );
    }

    #[test]
    fn zero_history_is_rejected() {
        let err = Config::from_toml_str("[diagnostics]\nhistory = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn blank_filter_is_rejected() {
        let err = Config::from_toml_str("[logging]\nfilter = \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("logging.filter"));
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        let err = Config::from_toml_str("[diagnostics]\nmode = \"loud\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn parse_errors_carry_the_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[store").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        match err {
            ConfigError::ParseError { path, .. } => assert_eq!(path, file.path()),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }
}
