//! Test publishers — mock `Publisher` implementations for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use changeflow_core::envelope::EventEnvelope;
use changeflow_core::error::BridgeError;
use changeflow_core::publisher::Publisher;

/// A publisher that records every `publish` call and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, EventEnvelope)>>,
    close_calls: AtomicUsize,
}

impl RecordingPublisher {
    /// Creates an empty recording publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all `(channel, envelope)` pairs published so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn published(&self) -> Vec<(String, EventEnvelope)> {
        self.published.lock().unwrap().clone()
    }

    /// Number of successful `publish` calls.
    #[must_use]
    pub fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    /// Number of `close` calls.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, channel: &str, envelope: &EventEnvelope) -> Result<(), BridgeError> {
        self.published
            .lock()
            .unwrap()
            .push((channel.to_owned(), envelope.clone()));
        Ok(())
    }

    async fn close(&self) -> Result<(), BridgeError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A publisher that fails every `publish` call. Useful for worker
/// error-handling paths.
#[derive(Debug, Default)]
pub struct FailingPublisher {
    attempts: AtomicUsize,
}

impl FailingPublisher {
    /// Creates a failing publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `publish` attempts observed.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for FailingPublisher {
    async fn publish(&self, _channel: &str, _envelope: &EventEnvelope) -> Result<(), BridgeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(BridgeError::Publish("sink unavailable".into()))
    }

    async fn close(&self) -> Result<(), BridgeError> {
        Ok(())
    }
}
