//! Task construction
//!
//! Expands the job's glob pattern into a lazy stream of [`FileTask`]s. Each
//! task pairs one matched path with the shared, read-only [`JobConfig`].
//! Paths are yielded in whatever order the glob walk produces them; nothing
//! is collected up front.

use crate::config::JobConfig;
use crate::pipeline::PipelineShape;
use crate::Result;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// One input file plus the configuration it is processed with
#[derive(Debug, Clone)]
pub struct FileTask {
    path: PathBuf,
    config: Arc<JobConfig>,
}

impl FileTask {
    pub fn new(path: PathBuf, config: Arc<JobConfig>) -> Self {
        Self { path, config }
    }

    /// Input file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Pipeline topology for this task
    pub fn shape(&self) -> PipelineShape {
        PipelineShape::select(self.config.input_compressed, self.config.output_compressed)
    }

    /// Where this task's single output artifact is written
    pub fn output_path(&self) -> PathBuf {
        self.shape().output_path(&self.path)
    }
}

/// Builds file tasks from the configured glob pattern
pub struct TaskBuilder {
    config: Arc<JobConfig>,
}

impl TaskBuilder {
    pub fn new(config: Arc<JobConfig>) -> Self {
        Self { config }
    }

    /// Start the glob walk
    ///
    /// Fails only if the pattern itself is malformed. A pattern that matches
    /// nothing yields an empty iterator. Wildcards do not match a leading
    /// `.`, so hidden files are only picked up when the pattern names the dot.
    pub fn tasks(&self) -> Result<Tasks> {
        let paths = glob::glob_with(&self.config.pattern, match_options())
            .with_context(|| format!("Invalid input pattern: {}", self.config.pattern))?;

        Ok(Tasks {
            paths,
            config: Arc::clone(&self.config),
        })
    }
}

fn match_options() -> glob::MatchOptions {
    glob::MatchOptions {
        require_literal_leading_dot: true,
        ..glob::MatchOptions::new()
    }
}

/// Lazy, single-pass task sequence
pub struct Tasks {
    paths: glob::Paths,
    config: Arc<JobConfig>,
}

impl Iterator for Tasks {
    type Item = FileTask;

    fn next(&mut self) -> Option<FileTask> {
        loop {
            match self.paths.next()? {
                Ok(path) if path.is_dir() => {
                    debug!(path = %path.display(), "skipping directory match");
                }
                Ok(path) => return Some(FileTask::new(path, Arc::clone(&self.config))),
                Err(e) => {
                    warn!(
                        path = %e.path().display(),
                        error = %e.error(),
                        "unreadable glob entry skipped"
                    );
                }
            }
        }
    }
}
