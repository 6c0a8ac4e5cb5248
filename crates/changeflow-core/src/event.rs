//! Change events scanned from the source database.

/// One row-level change produced by an aggregate's change-query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Operation tag from the source, typically an insert/update/delete code.
    pub operation: String,
    /// Transaction-level version assigned by the source database.
    pub change_version: i64,
    /// Key identifying the changed entity.
    pub aggregate_key: String,
    /// Serialized payload, usually JSON text.
    pub payload: String,
}
