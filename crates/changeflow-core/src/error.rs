//! Pipeline error types.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the change-tracking pipeline.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Missing or unparsable configuration (environment or registry file).
    /// Fatal at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Watermark lookup or update for an aggregate that was never registered.
    #[error("unknown aggregate: {0}")]
    UnknownAggregate(String),

    /// An envelope failed validation before dispatch or publication.
    #[error("invalid event envelope: {0}")]
    InvalidEnvelope(&'static str),

    /// Source-database query or row-scan failure. The cycle aborts and the
    /// watermark stays where it was.
    #[error("source query failed: {0}")]
    SourceQuery(String),

    /// Sink write failure. Absorbed by the dispatch worker.
    #[error("failed to publish event: {0}")]
    Publish(String),

    /// Watermark store I/O failure.
    #[error("watermark store error: {0}")]
    Store(String),

    /// Startup chain failure after retries were exhausted.
    #[error("startup failed: {0}")]
    Startup(String),

    /// The graceful shutdown window elapsed with work still in flight.
    #[error("graceful shutdown exceeded {0:?}")]
    ShutdownTimeout(Duration),
}
