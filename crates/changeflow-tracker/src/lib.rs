//! Changeflow Tracker — aggregate registry and per-aggregate change cycles.

mod registry;
mod tracker;

pub use registry::{Aggregate, Registry};
pub use tracker::{Tracker, TrackerTasks};
