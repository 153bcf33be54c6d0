//! annobatch - parallel batch driver for external annotators
//!
//! annobatch expands a glob pattern into input files and runs an external
//! linguistic annotator (for example UDPipe) over each one on a bounded
//! worker pool, optionally decompressing input and compressing output with
//! streaming xz tools.
//!
//! # Architecture
//!
//! - **Task building** ([`task`]): glob pattern → lazy stream of file tasks
//! - **Pipelines** ([`pipeline`]): one task → chain of 1-3 external processes
//! - **Dispatch** ([`dispatcher`]): bounded worker pool, batching, fail-fast
//! - **Configuration** ([`config`]): CLI, TOML job files, validation

pub mod config;
pub mod dispatcher;
pub mod output;
pub mod pipeline;
pub mod task;

// Re-export commonly used types
pub use config::JobConfig;
pub use dispatcher::{DispatchSummary, Dispatcher};
pub use pipeline::{PipelineRunner, PipelineShape};
pub use task::{FileTask, TaskBuilder};

use std::sync::Arc;

/// Result type used throughout annobatch
pub type Result<T> = anyhow::Result<T>;

/// Build tasks from the configured pattern and process them all
///
/// A task failure comes back as a [`dispatcher::DispatchError`] inside the
/// `anyhow::Error`, carrying the summary of the aborted run.
pub fn run_job(config: Arc<JobConfig>) -> Result<DispatchSummary> {
    let tasks = TaskBuilder::new(Arc::clone(&config)).tasks()?;
    let mut dispatcher = Dispatcher::from_config(&config);
    Ok(dispatcher.run(tasks)?)
}
