//! Publisher capability.

use async_trait::async_trait;

use crate::envelope::EventEnvelope;
use crate::error::BridgeError;

/// Anything that can durably hand an envelope to an event sink.
///
/// Implementations must be safe under concurrent callers; the dispatch
/// worker pool publishes in parallel.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Validates the envelope and appends it to the sink under the given
    /// channel. Validation happens before any side effect.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidEnvelope`] for an invalid envelope and
    /// [`BridgeError::Publish`] for sink failures. There is no local retry.
    async fn publish(&self, channel: &str, envelope: &EventEnvelope) -> Result<(), BridgeError>;

    /// Releases the underlying connection. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Publish`] if the sink cannot be flushed.
    async fn close(&self) -> Result<(), BridgeError>;
}
