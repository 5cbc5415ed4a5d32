//! Background ingestion: uploaded bytes to searchable vectors

mod pipeline;
mod worker;

pub use pipeline::IngestPipeline;
pub use worker::{IngestJob, IngestQueue, IngestWorker};
