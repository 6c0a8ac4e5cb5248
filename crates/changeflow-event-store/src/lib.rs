//! Changeflow Event Store — publisher implementations for the event sink.

pub mod message_bus;
pub mod pg_event_log;
pub mod schema;

pub use message_bus::NatsPublisher;
pub use pg_event_log::PgEventLogPublisher;
