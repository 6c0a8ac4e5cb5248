//! Supervisor: startup ordering, cancellation propagation, graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use changeflow_core::error::BridgeError;
use changeflow_core::publisher::Publisher;
use changeflow_core::watermark::WatermarkStore;
use changeflow_dispatcher::Dispatcher;
use changeflow_event_store::{NatsPublisher, PgEventLogPublisher};
use changeflow_tracker::{Tracker, TrackerTasks};
use changeflow_watermark::LmdbWatermarkStore;
use sqlx::AnyPool;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, EventSink};
use crate::database;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(200);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

/// Runs the service until a shutdown signal arrives, then tears the pipeline
/// down in reverse order within the shutdown window.
///
/// # Errors
///
/// Returns [`BridgeError::Startup`]/[`BridgeError::InvalidConfig`] when the
/// startup chain fails and [`BridgeError::ShutdownTimeout`] when graceful
/// shutdown exceeds its window.
pub async fn run(config: Config) -> Result<(), BridgeError> {
    tracing::info!(environment = ?config.environment, "changeflow service starting");

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    let pipeline = tokio::time::timeout(STARTUP_TIMEOUT, start_pipeline(&config, &shutdown))
        .await
        .map_err(|_| BridgeError::Startup(format!("startup exceeded {STARTUP_TIMEOUT:?}")))??;

    shutdown.cancelled().await;
    tracing::info!("shutdown initiated, waiting for background tasks");

    tokio::time::timeout(SHUTDOWN_TIMEOUT, pipeline.shutdown())
        .await
        .map_err(|_| BridgeError::ShutdownTimeout(SHUTDOWN_TIMEOUT))?;

    tracing::info!("all background tasks finished, service shut down gracefully");
    Ok(())
}

/// Everything the supervisor owns, in startup order.
struct Pipeline {
    source: AnyPool,
    publisher: Arc<dyn Publisher>,
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn WatermarkStore>,
    tracker_tasks: TrackerTasks,
}

async fn start_pipeline(
    config: &Config,
    shutdown: &CancellationToken,
) -> Result<Pipeline, BridgeError> {
    let source = database::connect_source(&config.source, shutdown).await?;

    let publisher: Arc<dyn Publisher> = match &config.event_sink {
        EventSink::Postgres { uri } => {
            let sink = database::connect_sink(uri).await?;
            tracing::info!("event-log publisher initialized");
            Arc::new(PgEventLogPublisher::new(sink))
        }
        EventSink::Nats { uri } => {
            let publisher = NatsPublisher::connect(uri).await?;
            tracing::info!("message-bus publisher initialized");
            Arc::new(publisher)
        }
    };

    let dispatcher = Arc::new(Dispatcher::new(
        config.dispatcher.num_workers,
        config.dispatcher.job_queue_size,
        Arc::clone(&publisher),
    ));
    dispatcher.start().await;
    tracing::info!(
        num_workers = config.dispatcher.num_workers,
        job_queue_size = config.dispatcher.job_queue_size,
        "dispatcher started"
    );

    let store: Arc<dyn WatermarkStore> =
        Arc::new(LmdbWatermarkStore::open(&config.watermark_path)?);

    let tracker = Arc::new(
        Tracker::new(
            &config.aggregates_path,
            Arc::clone(&store),
            source.clone(),
            Arc::clone(&dispatcher),
        )
        .await?,
    );
    let tracker_tasks = tracker.start(shutdown);
    tracing::info!("tracker started");

    Ok(Pipeline {
        source,
        publisher,
        dispatcher,
        store,
        tracker_tasks,
    })
}

impl Pipeline {
    /// Reverse-order teardown. The tracker tasks are joined first so no task
    /// can dispatch into the closing queue; the dispatcher then drains
    /// whatever is still enqueued.
    async fn shutdown(self) {
        self.tracker_tasks.join().await;
        tracing::info!("tracker tasks stopped");

        self.dispatcher.stop().await;

        if let Err(error) = self.store.close().await {
            tracing::error!(%error, "failed to close watermark store");
        }
        if let Err(error) = self.publisher.close().await {
            tracing::error!(%error, "failed to close publisher");
        }
        self.source.close().await;
        tracing::info!("database connection pools closed");
    }
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let Ok(mut terminate) = signal(SignalKind::terminate()) else {
        let _ = tokio::signal::ctrl_c().await;
        return;
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
