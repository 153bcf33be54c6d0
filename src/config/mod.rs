//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! Everything ends up in a [`JobConfig`], which is built once at startup and
//! shared read-only by every task.

pub mod cli;
pub mod toml;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Flag marker every annotator argument must start with
pub const ARG_FLAG_MARKER: &str = "--";

/// Complete job configuration
///
/// Immutable after construction. Tasks hold it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Annotator arguments, in command-line order
    pub args: Vec<String>,
    /// Model resource handed to the annotator (opaque, never opened here)
    pub model: PathBuf,
    /// Glob pattern selecting input files
    pub pattern: String,
    /// Inputs are compressed and must be decompressed first
    #[serde(default)]
    pub input_compressed: bool,
    /// Annotator output is piped through the compressor
    #[serde(default)]
    pub output_compressed: bool,
    /// Worker pool size (None = host CPU count)
    #[serde(default)]
    pub workers: Option<usize>,
    /// Tasks per pool submission (None = one task per submission)
    #[serde(default)]
    pub chunk_size: Option<usize>,
    /// External programs and their flag spellings
    #[serde(default)]
    pub tools: ToolConfig,
    /// How stage exit statuses are treated
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl JobConfig {
    /// Worker count actually used by the dispatcher
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }

    /// Batch size actually used by the dispatcher
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(1)
    }
}

/// External collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Annotator binary
    pub annotator: String,
    /// Flag that puts the annotator into immediate (streaming) mode
    pub immediate_flag: String,
    /// Flag naming the annotator's output file, joined as `<flag>=<path>`
    pub outfile_flag: String,
    /// Reads a named file, writes decompressed bytes to stdout
    pub decompressor: String,
    /// Reads stdin, writes compressed bytes to stdout
    pub compressor: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            annotator: "udpipe".to_string(),
            immediate_flag: "--immediate".to_string(),
            outfile_flag: "--outfile".to_string(),
            decompressor: "xzcat".to_string(),
            compressor: "xz".to_string(),
        }
    }
}

/// Exit status handling for pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Every stage of every pipeline shape must exit zero
    #[default]
    Strict,
    /// Only the plain file-to-file shape is checked; other shapes log and continue
    BestEffort,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Strict => write!(f, "strict"),
            FailurePolicy::BestEffort => write!(f, "best-effort"),
        }
    }
}
