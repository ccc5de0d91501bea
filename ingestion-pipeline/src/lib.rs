pub mod extraction;
pub mod pipeline;
pub mod worker;

pub use pipeline::{IngestPipeline, IngestReport};
pub use worker::{run_worker_loop, GraphBuildRegistry, TaskProcessor};
