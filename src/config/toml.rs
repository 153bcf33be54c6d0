//! TOML configuration file parsing
//!
//! A job file can carry every CLI setting plus a `[tools]` table:
//!
//! ```toml
//! args = ["--tokenize", "--tag", "--parse"]
//! model = "./russian-syntagrus-ud-2.5-191206.udpipe"
//! pattern = "./data/ru.*.txt.xz"
//! input_compressed = true
//! output_compressed = true
//! workers = 4
//! failure_policy = "strict"
//!
//! [tools]
//! annotator = "/opt/udpipe/bin/udpipe"
//! ```

use super::*;
use crate::config::cli::Cli;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Job settings as they appear in a TOML file (every field optional)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub args: Option<Vec<String>>,
    pub model: Option<PathBuf>,
    pub pattern: Option<String>,
    pub input_compressed: Option<bool>,
    pub output_compressed: Option<bool>,
    pub workers: Option<usize>,
    pub chunk_size: Option<usize>,
    pub failure_policy: Option<FailurePolicy>,
    pub tools: Option<FileToolConfig>,
}

/// `[tools]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileToolConfig {
    pub annotator: Option<String>,
    pub immediate_flag: Option<String>,
    pub outfile_flag: Option<String>,
    pub decompressor: Option<String>,
    pub compressor: Option<String>,
}

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<FileConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<FileConfig> {
    let config: FileConfig = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, file: FileConfig) -> Result<JobConfig> {
    // Repeated --arg replaces the file's list wholesale; order is never mixed
    let args = if cli.args.is_empty() {
        file.args.unwrap_or_default()
    } else {
        cli.args.clone()
    };

    let model = cli
        .model
        .clone()
        .or(file.model)
        .context("No model given (use --model or `model` in the config file)")?;

    let pattern = cli
        .path_dir
        .clone()
        .or(file.pattern)
        .context("No input pattern given (use --path_dir or `pattern` in the config file)")?;

    // Boolean flags can only switch a setting on
    let input_compressed = cli.input_xz || file.input_compressed.unwrap_or(false);
    let output_compressed = cli.output_xz || file.output_compressed.unwrap_or(false);

    let failure_policy = if cli.best_effort {
        FailurePolicy::BestEffort
    } else {
        file.failure_policy.unwrap_or_default()
    };

    let mut tools = ToolConfig::default();
    if let Some(file_tools) = file.tools {
        if let Some(annotator) = file_tools.annotator {
            tools.annotator = annotator;
        }
        if let Some(flag) = file_tools.immediate_flag {
            tools.immediate_flag = flag;
        }
        if let Some(flag) = file_tools.outfile_flag {
            tools.outfile_flag = flag;
        }
        if let Some(decompressor) = file_tools.decompressor {
            tools.decompressor = decompressor;
        }
        if let Some(compressor) = file_tools.compressor {
            tools.compressor = compressor;
        }
    }
    if let Some(ref annotator) = cli.annotator {
        tools.annotator = annotator.clone();
    }
    if let Some(ref decompressor) = cli.decompressor {
        tools.decompressor = decompressor.clone();
    }
    if let Some(ref compressor) = cli.compressor {
        tools.compressor = compressor.clone();
    }

    Ok(JobConfig {
        args,
        model,
        pattern,
        input_compressed,
        output_compressed,
        workers: cli.workers.or(file.workers),
        chunk_size: cli.chunksize.or(file.chunk_size),
        tools,
        failure_policy,
    })
}

/// Build the job configuration from the CLI alone or CLI + config file
pub fn load_job_config(cli: &Cli) -> Result<JobConfig> {
    let file = match cli.config {
        Some(ref path) => parse_toml_file(path)?,
        None => FileConfig::default(),
    };
    merge_cli_with_config(cli, file)
}
