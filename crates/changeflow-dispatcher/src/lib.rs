//! Changeflow Dispatcher — bounded job queue and publish worker pool.

mod dispatcher;

pub use dispatcher::{Dispatcher, Job};
