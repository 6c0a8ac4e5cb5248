//! Database connection pools.

use std::time::Duration;

use changeflow_core::error::BridgeError;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio_util::sync::CancellationToken;

use crate::config::SourcePoolConfig;

const MAX_CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_BASE_DELAY: Duration = Duration::from_secs(5);
const SINK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to the ERP source database, retrying with exponential backoff.
/// The pool establishes and verifies a connection before this returns.
///
/// # Errors
///
/// Returns [`BridgeError::Startup`] after the final attempt fails or when
/// shutdown is requested while waiting between attempts.
pub async fn connect_source(
    config: &SourcePoolConfig,
    shutdown: &CancellationToken,
) -> Result<AnyPool, BridgeError> {
    sqlx::any::install_default_drivers();
    tracing::info!(
        max_attempts = MAX_CONNECT_ATTEMPTS,
        base_delay = ?CONNECT_BASE_DELAY,
        "connecting to source database"
    );

    let mut attempt = 1;
    loop {
        match AnyPoolOptions::new()
            .max_connections(config.max_open_conns)
            .min_connections(config.max_idle_conns.min(config.max_open_conns))
            .idle_timeout(config.max_idle_time)
            .connect(&config.uri)
            .await
        {
            Ok(pool) => {
                tracing::info!(attempt, "source database connection established");
                return Ok(pool);
            }
            Err(error) if attempt < MAX_CONNECT_ATTEMPTS => {
                let delay = CONNECT_BASE_DELAY * 2u32.pow(attempt - 1);
                tracing::warn!(attempt, %error, ?delay, "source connection failed, retrying");
                tokio::select! {
                    () = shutdown.cancelled() => {
                        return Err(BridgeError::Startup(
                            "cancelled while connecting to source database".into(),
                        ));
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
            Err(error) => {
                return Err(BridgeError::Startup(format!(
                    "source database connection failed after {MAX_CONNECT_ATTEMPTS} attempts: {error}"
                )));
            }
        }
        attempt += 1;
    }
}

/// Connects to the event-log database. Fails immediately on error.
///
/// # Errors
///
/// Returns [`BridgeError::Startup`] when the pool cannot be established.
pub async fn connect_sink(uri: &str) -> Result<PgPool, BridgeError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .idle_timeout(Duration::from_secs(300))
        .acquire_timeout(SINK_ACQUIRE_TIMEOUT)
        .connect(uri)
        .await
        .map_err(|e| BridgeError::Startup(format!("failed to connect to postgres database: {e}")))?;
    tracing::info!("postgres connection pool established");
    Ok(pool)
}
