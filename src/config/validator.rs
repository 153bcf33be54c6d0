//! Configuration validation

use super::*;
use anyhow::Result;

/// Validate complete configuration
pub fn validate_config(config: &JobConfig) -> Result<()> {
    validate_args(&config.args)?;
    validate_inputs(config)?;
    validate_pool(config)?;
    validate_tools(&config.tools)?;

    Ok(())
}

/// Validate annotator arguments
pub fn validate_args(args: &[String]) -> Result<()> {
    if args.is_empty() {
        anyhow::bail!("at least one annotator argument (--arg) is required");
    }

    for (i, arg) in args.iter().enumerate() {
        if !arg.starts_with(ARG_FLAG_MARKER) {
            anyhow::bail!(
                "annotator argument {} ({:?}) must start with {}",
                i,
                arg,
                ARG_FLAG_MARKER
            );
        }
    }

    Ok(())
}

/// Validate model and input pattern
///
/// The model is only checked for being non-empty: it is opaque to us and
/// a bad model is reported by the annotator itself.
fn validate_inputs(config: &JobConfig) -> Result<()> {
    if config.model.as_os_str().is_empty() {
        anyhow::bail!("model path must not be empty");
    }
    if config.pattern.trim().is_empty() {
        anyhow::bail!("input pattern must not be empty");
    }
    if let Err(e) = glob::Pattern::new(&config.pattern) {
        anyhow::bail!("invalid input pattern {:?}: {}", config.pattern, e);
    }
    Ok(())
}

/// Validate worker pool settings
fn validate_pool(config: &JobConfig) -> Result<()> {
    if config.workers == Some(0) {
        anyhow::bail!("workers must be at least 1");
    }
    if config.chunk_size == Some(0) {
        anyhow::bail!("chunk size must be at least 1");
    }
    Ok(())
}

/// Validate external tool settings
fn validate_tools(tools: &ToolConfig) -> Result<()> {
    let programs = [
        ("annotator", &tools.annotator),
        ("decompressor", &tools.decompressor),
        ("compressor", &tools.compressor),
    ];
    for (role, program) in programs {
        if program.trim().is_empty() {
            anyhow::bail!("{} program must not be empty", role);
        }
    }

    if tools.outfile_flag.is_empty() {
        anyhow::bail!("annotator outfile flag must not be empty");
    }

    Ok(())
}
