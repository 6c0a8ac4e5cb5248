//! NATS implementation of the `Publisher` trait.

use async_trait::async_trait;
use changeflow_core::envelope::EventEnvelope;
use changeflow_core::error::BridgeError;
use changeflow_core::publisher::Publisher;

/// Publisher that sends envelopes to a NATS subject per channel.
#[derive(Debug, Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    /// Connects to the NATS server at `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Startup`] when the connection cannot be
    /// established.
    pub async fn connect(uri: &str) -> Result<Self, BridgeError> {
        let client = async_nats::connect(uri)
            .await
            .map_err(|e| BridgeError::Startup(format!("failed to connect to NATS: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Publisher for NatsPublisher {
    async fn publish(&self, channel: &str, envelope: &EventEnvelope) -> Result<(), BridgeError> {
        envelope.validate()?;

        let bytes = serde_json::to_vec(&envelope.normalized())
            .map_err(|e| BridgeError::Publish(format!("failed to serialize envelope: {e}")))?;
        self.client
            .publish(channel.to_owned(), bytes.into())
            .await
            .map_err(|e| {
                BridgeError::Publish(format!("failed to publish to subject '{channel}': {e}"))
            })?;

        tracing::debug!(
            subject = channel,
            event_type = %envelope.event_type,
            aggregate_key = %envelope.aggregate_key,
            "message published to NATS"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), BridgeError> {
        // Flush pushes any buffered messages out before the client drops.
        self.client
            .flush()
            .await
            .map_err(|e| BridgeError::Publish(format!("failed to flush NATS client: {e}")))
    }
}
