//! Shared test fakes for the changeflow pipeline.

mod publisher;
mod watermark;

pub use publisher::{FailingPublisher, RecordingPublisher};
pub use watermark::InMemoryWatermarkStore;
