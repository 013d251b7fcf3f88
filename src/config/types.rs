use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{DiagnosticMode, DEFAULT_HISTORY};

/// Root configuration container. Every section is optional in TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub diagnostics: DiagnosticsConfig,
    pub logging: LoggingConfig,
}

/// Settings applied to stores built with `StoreOptions::from_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Report actions sent from a thread other than the one that created
    /// the store (default: true).
    #[serde(default = "default_thread_checks")]
    pub thread_checks: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            thread_checks: default_thread_checks(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// `log` or `strict` (default: log).
    #[serde(default)]
    pub mode: DiagnosticMode,
    /// Number of recent diagnostics kept for inspection (default: 64).
    #[serde(default = "default_history")]
    pub history: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            mode: DiagnosticMode::default(),
            history: default_history(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `UNISTORE_LOG` is unset
    /// (default: "warn").
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Base path for log files. Logs go to stderr when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            file: None,
        }
    }
}

fn default_thread_checks() -> bool {
    true
}

fn default_history() -> usize {
    DEFAULT_HISTORY
}

fn default_filter() -> String {
    "warn".to_string()
}
