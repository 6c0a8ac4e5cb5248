//! `PostgreSQL` event-log implementation of the `Publisher` trait.

use async_trait::async_trait;
use changeflow_core::envelope::EventEnvelope;
use changeflow_core::error::BridgeError;
use changeflow_core::publisher::Publisher;
use sqlx::PgPool;

const INSERT_EVENT: &str = r"
INSERT INTO erp_events (
    event_id, event_type, event_version, aggregate_key,
    change_version, timestamp, correlation_id, causation_id,
    user_id, payload
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
";

/// Publisher that appends envelopes to the `erp_events` table.
#[derive(Debug, Clone)]
pub struct PgEventLogPublisher {
    pool: PgPool,
}

impl PgEventLogPublisher {
    /// Creates a new `PgEventLogPublisher` over the sink pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Publisher for PgEventLogPublisher {
    async fn publish(&self, channel: &str, envelope: &EventEnvelope) -> Result<(), BridgeError> {
        envelope.validate()?;

        sqlx::query(INSERT_EVENT)
            .bind(envelope.event_id)
            .bind(&envelope.event_type)
            .bind(envelope.event_version)
            .bind(&envelope.aggregate_key)
            .bind(envelope.change_version)
            .bind(envelope.timestamp)
            .bind(envelope.correlation_id.as_deref())
            .bind(envelope.causation_id.as_deref())
            .bind(envelope.user_id.as_deref())
            .bind(envelope.normalized_payload())
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::Publish(format!("failed to insert event: {e}")))?;

        tracing::debug!(
            channel,
            event_type = %envelope.event_type,
            aggregate_key = %envelope.aggregate_key,
            "event stored in event log"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), BridgeError> {
        if !self.pool.is_closed() {
            tracing::info!("closing event-log connection pool");
        }
        self.pool.close().await;
        Ok(())
    }
}
