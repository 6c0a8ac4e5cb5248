//! Service configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use changeflow_core::error::BridgeError;

const DEFAULT_MAX_OPEN_CONNS: u32 = 10;
const DEFAULT_MAX_IDLE_CONNS: u32 = 10;
const DEFAULT_MAX_IDLE_TIME_SECS: u64 = 300;
const DEFAULT_NUM_WORKERS: usize = 10;
const DEFAULT_JOB_QUEUE_SIZE: usize = 100;

/// Deployment environment; decides the logging setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Human-readable logs to stdout at debug level.
    Development,
    /// JSON logs to an explicitly configured file.
    Production,
}

/// Source database pool settings.
#[derive(Debug, Clone)]
pub struct SourcePoolConfig {
    /// Connection URI for the ERP database.
    pub uri: String,
    /// Upper bound on open connections.
    pub max_open_conns: u32,
    /// Connections kept alive while idle.
    pub max_idle_conns: u32,
    /// How long an idle connection may linger before being pruned.
    pub max_idle_time: Duration,
}

/// Dispatcher pool settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of publish workers.
    pub num_workers: usize,
    /// Capacity of the bounded job queue.
    pub job_queue_size: usize,
}

/// Which sink the publisher writes to.
#[derive(Debug, Clone)]
pub enum EventSink {
    /// Relational event log (the default).
    Postgres {
        /// Connection URI for the event-log database.
        uri: String,
    },
    /// NATS subject per channel.
    Nats {
        /// NATS server URI.
        uri: String,
    },
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment (`APP_ENV`, default `production`).
    pub environment: Environment,
    /// Log file, required outside development (`LOG_FILENAME`).
    pub log_filename: Option<PathBuf>,
    /// Source database pool.
    pub source: SourcePoolConfig,
    /// Watermark store file (`DB_PATH`).
    pub watermark_path: PathBuf,
    /// Aggregate registry file (`AGG_PATH`).
    pub aggregates_path: PathBuf,
    /// Dispatcher pool.
    pub dispatcher: DispatcherConfig,
    /// Event sink selection (`EVENT_SINK`, default `postgres`).
    pub event_sink: EventSink,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] when a required variable is
    /// missing or a value does not parse.
    pub fn from_env() -> Result<Self, BridgeError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Builds the configuration through a lookup function, so parsing is
    /// testable without touching the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] when a required variable is
    /// missing or a value does not parse.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, BridgeError> {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("development") => Environment::Development,
            _ => Environment::Production,
        };

        let log_filename = lookup("LOG_FILENAME").map(PathBuf::from);
        if environment == Environment::Production && log_filename.is_none() {
            return Err(BridgeError::InvalidConfig(
                "LOG_FILENAME must be set outside the development environment".into(),
            ));
        }

        let source = SourcePoolConfig {
            uri: required(lookup, "SOURCE_DB_URI")?,
            max_open_conns: positive_u32(lookup, "DB_MAX_OPEN_CONNS", DEFAULT_MAX_OPEN_CONNS)?,
            max_idle_conns: parse_or_default(lookup, "DB_MAX_IDLE_CONNS", DEFAULT_MAX_IDLE_CONNS)?,
            max_idle_time: Duration::from_secs(parse_or_default(
                lookup,
                "DB_MAX_IDLE_TIME_SECS",
                DEFAULT_MAX_IDLE_TIME_SECS,
            )?),
        };

        let dispatcher = DispatcherConfig {
            num_workers: positive_usize(lookup, "DISPATCHER_NUM_WORKERS", DEFAULT_NUM_WORKERS)?,
            job_queue_size: positive_usize(
                lookup,
                "DISPATCHER_JOB_QUEUE_SIZE",
                DEFAULT_JOB_QUEUE_SIZE,
            )?,
        };

        let event_sink = match lookup("EVENT_SINK").as_deref().unwrap_or("postgres") {
            "postgres" => EventSink::Postgres {
                uri: required(lookup, "POSTGRES_URI")?,
            },
            "nats" => EventSink::Nats {
                uri: required(lookup, "NATS_URI")?,
            },
            other => {
                return Err(BridgeError::InvalidConfig(format!(
                    "EVENT_SINK must be 'postgres' or 'nats', got '{other}'"
                )));
            }
        };

        Ok(Self {
            environment,
            log_filename,
            source,
            watermark_path: PathBuf::from(required(lookup, "DB_PATH")?),
            aggregates_path: PathBuf::from(required(lookup, "AGG_PATH")?),
            dispatcher,
            event_sink,
        })
    }
}

fn required(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<String, BridgeError> {
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| BridgeError::InvalidConfig(format!("{key} must be set")))
}

fn parse_or_default<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, BridgeError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| BridgeError::InvalidConfig(format!("{key} must be an integer, got '{raw}'"))),
    }
}

fn positive_u32(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: u32,
) -> Result<u32, BridgeError> {
    let value = parse_or_default(lookup, key, default)?;
    if value == 0 {
        return Err(BridgeError::InvalidConfig(format!("{key} must be positive")));
    }
    Ok(value)
}

fn positive_usize(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: usize,
) -> Result<usize, BridgeError> {
    let value = parse_or_default(lookup, key, default)?;
    if value == 0 {
        return Err(BridgeError::InvalidConfig(format!("{key} must be positive")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value).to_owned())
        }
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("SOURCE_DB_URI", "postgres://erp"),
        ("POSTGRES_URI", "postgres://sink"),
        ("DB_PATH", "/var/lib/changeflow/watermarks.db"),
        ("AGG_PATH", "/etc/changeflow/aggregates.yaml"),
        ("LOG_FILENAME", "/var/log/changeflow.log"),
    ];

    #[test]
    fn test_minimal_config_applies_defaults() {
        let config = Config::from_lookup(&lookup_from(MINIMAL)).unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.source.max_open_conns, 10);
        assert_eq!(config.source.max_idle_conns, 10);
        assert_eq!(config.source.max_idle_time, Duration::from_secs(300));
        assert_eq!(config.dispatcher.num_workers, 10);
        assert_eq!(config.dispatcher.job_queue_size, 100);
        assert!(matches!(config.event_sink, EventSink::Postgres { .. }));
    }

    #[test]
    fn test_missing_source_uri_is_rejected() {
        let err = Config::from_lookup(&lookup_from(&[
            ("POSTGRES_URI", "postgres://sink"),
            ("DB_PATH", "/tmp/w.db"),
            ("AGG_PATH", "/tmp/a.yaml"),
            ("LOG_FILENAME", "/tmp/log"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("SOURCE_DB_URI"));
    }

    #[test]
    fn test_production_requires_log_filename() {
        let err = Config::from_lookup(&lookup_from(&[
            ("SOURCE_DB_URI", "postgres://erp"),
            ("POSTGRES_URI", "postgres://sink"),
            ("DB_PATH", "/tmp/w.db"),
            ("AGG_PATH", "/tmp/a.yaml"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("LOG_FILENAME"));
    }

    #[test]
    fn test_development_does_not_require_log_filename() {
        let config = Config::from_lookup(&lookup_from(&[
            ("APP_ENV", "development"),
            ("SOURCE_DB_URI", "postgres://erp"),
            ("POSTGRES_URI", "postgres://sink"),
            ("DB_PATH", "/tmp/w.db"),
            ("AGG_PATH", "/tmp/a.yaml"),
        ]))
        .unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert!(config.log_filename.is_none());
    }

    #[test]
    fn test_nats_sink_requires_uri() {
        let err = Config::from_lookup(&lookup_from(&[
            ("APP_ENV", "development"),
            ("SOURCE_DB_URI", "postgres://erp"),
            ("DB_PATH", "/tmp/w.db"),
            ("AGG_PATH", "/tmp/a.yaml"),
            ("EVENT_SINK", "nats"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("NATS_URI"));
    }

    #[test]
    fn test_nats_sink_does_not_require_postgres_uri() {
        let config = Config::from_lookup(&lookup_from(&[
            ("APP_ENV", "development"),
            ("SOURCE_DB_URI", "postgres://erp"),
            ("DB_PATH", "/tmp/w.db"),
            ("AGG_PATH", "/tmp/a.yaml"),
            ("EVENT_SINK", "nats"),
            ("NATS_URI", "nats://localhost:4222"),
        ]))
        .unwrap();

        assert!(matches!(config.event_sink, EventSink::Nats { uri } if uri == "nats://localhost:4222"));
    }

    #[test]
    fn test_unknown_sink_is_rejected() {
        let err = Config::from_lookup(&lookup_from(&[
            ("APP_ENV", "development"),
            ("SOURCE_DB_URI", "postgres://erp"),
            ("DB_PATH", "/tmp/w.db"),
            ("AGG_PATH", "/tmp/a.yaml"),
            ("EVENT_SINK", "kafka"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("EVENT_SINK"));
    }

    #[test]
    fn test_unparsable_numeric_is_rejected() {
        let err = Config::from_lookup(&lookup_from(&[
            ("SOURCE_DB_URI", "postgres://erp"),
            ("POSTGRES_URI", "postgres://sink"),
            ("DB_PATH", "/tmp/w.db"),
            ("AGG_PATH", "/tmp/a.yaml"),
            ("LOG_FILENAME", "/tmp/log"),
            ("DISPATCHER_NUM_WORKERS", "many"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("DISPATCHER_NUM_WORKERS"));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let err = Config::from_lookup(&lookup_from(&[
            ("SOURCE_DB_URI", "postgres://erp"),
            ("POSTGRES_URI", "postgres://sink"),
            ("DB_PATH", "/tmp/w.db"),
            ("AGG_PATH", "/tmp/a.yaml"),
            ("LOG_FILENAME", "/tmp/log"),
            ("DISPATCHER_NUM_WORKERS", "0"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("positive"));
    }
}
