//! Tracing setup per environment.

use std::sync::Mutex;

use changeflow_core::error::BridgeError;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Environment};

/// Initializes the global tracing subscriber.
///
/// Development logs human-readable to stdout at debug level; any other
/// environment logs JSON to the configured file. `RUST_LOG` overrides the
/// default level in both cases.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidConfig`] when the log file cannot be opened.
pub fn init(config: &Config) -> Result<(), BridgeError> {
    match config.environment {
        Environment::Development => {
            tracing_subscriber::fmt()
                .with_env_filter(default_filter("debug"))
                .init();
        }
        Environment::Production => {
            // Presence is validated during configuration loading.
            let Some(path) = config.log_filename.as_deref() else {
                return Err(BridgeError::InvalidConfig("LOG_FILENAME must be set".into()));
            };
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    BridgeError::InvalidConfig(format!(
                        "failed to open log file {}: {e}",
                        path.display()
                    ))
                })?;
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(default_filter("info"))
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
    }
    Ok(())
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
