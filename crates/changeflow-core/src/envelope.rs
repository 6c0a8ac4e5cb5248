//! Versioned event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::BridgeError;

/// Schema version of the envelope itself.
pub const ENVELOPE_VERSION: i32 = 1;

/// Wraps a single source-row change together with its metadata on the way to
/// the event sink. Value-like: constructed, enqueued, published, discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier, freshly generated per envelope.
    pub event_id: Uuid,
    /// Routing type, formed as `erp.<aggregate>.<operation>`.
    pub event_type: String,
    /// Schema version of the envelope.
    pub event_version: i32,
    /// Natural or surrogate key of the changed entity.
    pub aggregate_key: String,
    /// Transaction-level version assigned by the source database.
    pub change_version: i64,
    /// Wall-clock time of envelope construction.
    pub timestamp: DateTime<Utc>,
    /// Correlation ID for request tracing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Causation ID linking this event to its cause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
    /// User ID for audit purposes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Opaque payload, usually JSON text produced by the source query.
    pub payload: Value,
}

impl EventEnvelope {
    /// Builds an envelope with a fresh event ID and the current timestamp.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        aggregate_key: impl Into<String>,
        change_version: i64,
        payload: Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            event_version: ENVELOPE_VERSION,
            aggregate_key: aggregate_key.into(),
            change_version,
            timestamp: Utc::now(),
            correlation_id: None,
            causation_id: None,
            user_id: None,
            payload,
        }
    }

    /// Sets the correlation ID. An empty string leaves the field absent.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = non_empty(id.into());
        self
    }

    /// Sets the causation ID. An empty string leaves the field absent.
    #[must_use]
    pub fn with_causation_id(mut self, id: impl Into<String>) -> Self {
        self.causation_id = non_empty(id.into());
        self
    }

    /// Sets the user ID. An empty string leaves the field absent.
    #[must_use]
    pub fn with_user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = non_empty(id.into());
        self
    }

    /// Checks that all required fields are present.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidEnvelope`] when `event_type` or
    /// `aggregate_key` is empty, or when the payload is JSON null.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.event_type.is_empty() {
            return Err(BridgeError::InvalidEnvelope("event type is required"));
        }
        if self.aggregate_key.is_empty() {
            return Err(BridgeError::InvalidEnvelope("aggregate key is required"));
        }
        if self.payload.is_null() {
            return Err(BridgeError::InvalidEnvelope("payload is required"));
        }
        Ok(())
    }

    /// Returns the payload with one level of JSON-text unwrapping: a string
    /// payload that parses as JSON is replaced by the parsed value, so valid
    /// JSON text reaches the sink verbatim instead of double-encoded. Any
    /// other payload passes through unchanged.
    #[must_use]
    pub fn normalized_payload(&self) -> Value {
        if let Value::String(raw) = &self.payload {
            if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
                return parsed;
            }
        }
        self.payload.clone()
    }

    /// Returns a copy of the envelope with the payload normalized, for sinks
    /// that serialize the whole envelope.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut envelope = self.clone();
        envelope.payload = self.normalized_payload();
        envelope
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
