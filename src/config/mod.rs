//! TOML configuration for stores, diagnostics and logging.

mod loader;
mod types;

pub use loader::{ConfigError, CONFIG_ENV};
pub use types::{Config, DiagnosticsConfig, LoggingConfig, StoreConfig};
