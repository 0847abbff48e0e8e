pub mod context;
pub mod hash;
pub mod pipeline;

pub use context::ResolutionContext;
pub use pipeline::{BatchPipeline, BatchReport, PipelineError, RowError};
