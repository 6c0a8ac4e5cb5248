//! Watermark store capability.

use async_trait::async_trait;

use crate::error::BridgeError;

/// Durable per-aggregate change-version storage.
///
/// The store writes versions verbatim; monotonicity is the tracker's
/// responsibility.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Registers aggregate names, atomically per call. A name that is absent
    /// is created with version 0; an existing name keeps its watermark, so
    /// re-registration is idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Store`] on storage failure.
    async fn register_aggregates(&self, names: &[String]) -> Result<(), BridgeError>;

    /// Returns the last committed change version for the aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownAggregate`] if the name was never
    /// registered.
    async fn get_change_version(&self, name: &str) -> Result<i64, BridgeError>;

    /// Writes the change version for the aggregate, flushed before return.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownAggregate`] if the name was never
    /// registered.
    async fn update_change_version(&self, name: &str, version: i64) -> Result<(), BridgeError>;

    /// Flushes and releases the store.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Store`] if the final flush fails.
    async fn close(&self) -> Result<(), BridgeError>;
}
