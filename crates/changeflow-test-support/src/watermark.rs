//! Test watermark store — in-memory `WatermarkStore` with call counters.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use changeflow_core::error::BridgeError;
use changeflow_core::watermark::WatermarkStore;

/// In-memory watermark store with the same registration and lookup semantics
/// as the durable one, plus call counters for cycle assertions.
#[derive(Debug, Default)]
pub struct InMemoryWatermarkStore {
    versions: Mutex<HashMap<String, i64>>,
    get_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl InMemoryWatermarkStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get_change_version` calls.
    #[must_use]
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Number of `update_change_version` calls.
    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WatermarkStore for InMemoryWatermarkStore {
    async fn register_aggregates(&self, names: &[String]) -> Result<(), BridgeError> {
        let mut versions = self.versions.lock().unwrap();
        for name in names {
            versions.entry(name.clone()).or_insert(0);
        }
        Ok(())
    }

    async fn get_change_version(&self, name: &str) -> Result<i64, BridgeError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.versions
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .ok_or_else(|| BridgeError::UnknownAggregate(name.to_owned()))
    }

    async fn update_change_version(&self, name: &str, version: i64) -> Result<(), BridgeError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut versions = self.versions.lock().unwrap();
        match versions.get_mut(name) {
            Some(current) => {
                *current = version;
                Ok(())
            }
            None => Err(BridgeError::UnknownAggregate(name.to_owned())),
        }
    }

    async fn close(&self) -> Result<(), BridgeError> {
        Ok(())
    }
}
