//! Event-log database schema.

/// SQL to create the ERP event-log table.
pub const CREATE_ERP_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS erp_events (
    event_id        UUID PRIMARY KEY,
    event_type      TEXT NOT NULL,
    event_version   INT NOT NULL,
    aggregate_key   TEXT NOT NULL,
    change_version  BIGINT NOT NULL,
    timestamp       TIMESTAMPTZ NOT NULL,
    correlation_id  TEXT NULL,
    causation_id    TEXT NULL,
    user_id         TEXT NULL,
    payload         JSONB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_erp_events_aggregate_key
    ON erp_events (aggregate_key, change_version);
";
