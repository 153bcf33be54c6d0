//! Pipeline error types

use super::StageRole;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single task's pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to start {role} stage `{program}` for {}: {source}", input.display())]
    Spawn {
        role: StageRole,
        program: String,
        input: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create output file {}: {source}", path.display())]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {role} stage `{program}` for {}: {source}", input.display())]
    Wait {
        role: StageRole,
        program: String,
        input: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{role} stage `{program}` failed for {} ({})", input.display(), describe_exit(*code))]
    StageFailed {
        role: StageRole,
        program: String,
        input: PathBuf,
        /// Exit code, or None when the process was killed by a signal
        code: Option<i32>,
    },
}

impl PipelineError {
    /// Input file of the failing task
    pub fn input(&self) -> Option<&std::path::Path> {
        match self {
            PipelineError::Spawn { input, .. }
            | PipelineError::Wait { input, .. }
            | PipelineError::StageFailed { input, .. } => Some(input.as_path()),
            PipelineError::Sink { .. } => None,
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}
