//! Per-aggregate change-tracking cycles.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use changeflow_core::envelope::EventEnvelope;
use changeflow_core::error::BridgeError;
use changeflow_core::event::ChangeEvent;
use changeflow_core::watermark::WatermarkStore;
use changeflow_dispatcher::{Dispatcher, Job};
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::{AnyPool, Row};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::registry::{Aggregate, Registry};

/// Polls the source database for row-level changes per aggregate, wraps each
/// change in an envelope, hands it to the dispatcher, and advances the
/// aggregate's watermark.
pub struct Tracker {
    aggregates: Vec<Aggregate>,
    store: Arc<dyn WatermarkStore>,
    source: AnyPool,
    dispatcher: Arc<Dispatcher>,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("aggregates", &self.aggregates)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Handles of the periodic tasks spawned by [`Tracker::start`]. The
/// supervisor joins these before stopping the dispatcher so that no task can
/// dispatch into a closed queue.
pub struct TrackerTasks {
    handles: Vec<JoinHandle<()>>,
}

impl TrackerTasks {
    /// Waits for every periodic task to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(error) = handle.await {
                tracing::error!(%error, "tracker task failed");
            }
        }
    }
}

impl Tracker {
    /// Loads the aggregate registry and registers all names with the
    /// watermark store. Fails fast on an unreadable or invalid registry and
    /// on registration errors.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] for registry problems and the
    /// store's error for registration failures.
    pub async fn new(
        aggregates_path: &Path,
        store: Arc<dyn WatermarkStore>,
        source: AnyPool,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self, BridgeError> {
        let registry = Registry::load(aggregates_path)?;
        store.register_aggregates(&registry.names()).await?;
        tracing::info!(
            aggregates = registry.aggregates.len(),
            "tracker initialized"
        );
        Ok(Self {
            aggregates: registry.aggregates,
            store,
            source,
            dispatcher,
        })
    }

    /// Spawns two periodic tasks per aggregate: the ERP change cycle and the
    /// app-cycle placeholder for the reverse flow. Neither runs at startup;
    /// the first execution happens after the first interval elapses. All
    /// tasks observe `shutdown` and exit at the next tick boundary.
    #[must_use]
    pub fn start(self: &Arc<Self>, shutdown: &CancellationToken) -> TrackerTasks {
        let mut handles = Vec::with_capacity(self.aggregates.len() * 2);
        for aggregate in &self.aggregates {
            handles.push(tokio::spawn(erp_cycle_loop(
                Arc::clone(self),
                aggregate.clone(),
                shutdown.clone(),
            )));
            handles.push(tokio::spawn(app_cycle_loop(
                aggregate.clone(),
                shutdown.clone(),
            )));
        }
        TrackerTasks { handles }
    }

    /// One poll-scan-enqueue-advance pass for one aggregate. Any failure
    /// aborts the pass without touching the watermark; the next tick retries
    /// from the same version.
    async fn run_erp_cycle(&self, name: &str, query: &str) -> Result<(), BridgeError> {
        let since = self.store.get_change_version(name).await?;

        let (count, new_version) = self.fetch_changes(name, query, since).await?;
        if count == 0 {
            tracing::info!(aggregate = name, "no changes found");
            return Ok(());
        }

        self.store.update_change_version(name, new_version).await?;
        tracing::info!(
            aggregate = name,
            since,
            rows = count,
            new_version,
            "erp cycle completed"
        );
        Ok(())
    }

    /// Runs the aggregate's change-query with the watermark bound as its
    /// single parameter and streams the result set. Rows are enqueued in
    /// result-set order; rows already enqueued when a later row fails are not
    /// rolled back, so consumers must tolerate re-delivery after a partial
    /// cycle.
    async fn fetch_changes(
        &self,
        name: &str,
        query: &str,
        since: i64,
    ) -> Result<(usize, i64), BridgeError> {
        let mut rows = sqlx::query(query).bind(since).fetch(&self.source);

        let mut count = 0usize;
        let mut max_version = since;
        while let Some(row) = rows
            .try_next()
            .await
            .map_err(|e| BridgeError::SourceQuery(format!("query execution failed: {e}")))?
        {
            let event = ChangeEvent {
                operation: row.try_get(0).map_err(scan_err)?,
                change_version: row.try_get(1).map_err(scan_err)?,
                aggregate_key: row.try_get(2).map_err(scan_err)?,
                payload: row.try_get(3).map_err(scan_err)?,
            };
            max_version = max_version.max(event.change_version);
            self.dispatch_erp_change(event, name).await?;
            count += 1;
        }

        Ok((count, max_version))
    }

    /// Wraps one change event in an envelope and enqueues it.
    async fn dispatch_erp_change(&self, event: ChangeEvent, name: &str) -> Result<(), BridgeError> {
        let event_type = format!("erp.{name}.{}", event.operation);
        let channel = format!("erp.{name}");

        let envelope = EventEnvelope::new(
            event_type,
            event.aggregate_key,
            event.change_version,
            Value::String(event.payload),
        );
        envelope.validate()?;

        self.dispatcher.dispatch(Job { channel, envelope }).await
    }
}

/// Periodic ERP change-tracking task for one aggregate.
async fn erp_cycle_loop(tracker: Arc<Tracker>, aggregate: Aggregate, shutdown: CancellationToken) {
    let period = Duration::from_secs(aggregate.interval);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    // Coalesce ticks missed while a long cycle was running.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                tracing::info!(aggregate = %aggregate.name, "change tracking stopping");
                return;
            }
            _ = ticker.tick() => {
                if let Err(error) = tracker
                    .run_erp_cycle(&aggregate.name, &aggregate.get_query)
                    .await
                {
                    tracing::error!(
                        aggregate = %aggregate.name,
                        %error,
                        "erp change tracking cycle failed"
                    );
                }
            }
        }
    }
}

/// Placeholder tick for the symmetric reverse flow (sink to source). Kept so
/// every aggregate owns the same pair of periodic tasks.
async fn app_cycle_loop(aggregate: Aggregate, shutdown: CancellationToken) {
    let period = Duration::from_secs(aggregate.interval);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                tracing::info!(aggregate = %aggregate.name, "app cycle stopping");
                return;
            }
            _ = ticker.tick() => {
                tracing::debug!(aggregate = %aggregate.name, "app cycle tick");
            }
        }
    }
}

fn scan_err(err: sqlx::Error) -> BridgeError {
    BridgeError::SourceQuery(format!("row scan failed: {err}"))
}
