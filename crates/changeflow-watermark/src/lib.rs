//! Changeflow Watermark — durable per-aggregate change-version storage.

mod lmdb_store;

pub use lmdb_store::LmdbWatermarkStore;
