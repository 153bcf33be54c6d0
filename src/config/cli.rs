//! CLI argument parsing using clap

use clap::Parser;
use std::path::PathBuf;

/// annobatch - run an external annotator over many files in parallel
///
/// Example:
///
///   annobatch --input-xz --output-xz --arg=--tokenize --arg=--tag --arg=--parse
///             --model=./russian-syntagrus-ud-2.5-191206.udpipe
///             --path_dir='./data/ru.*.txt.xz' --workers=4
#[derive(Parser, Debug, Default)]
#[command(name = "annobatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Argument to pass to the annotator (must start with --); repeatable, order preserved
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Annotator model
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Glob pattern selecting the input files
    #[arg(long = "path_dir", value_name = "PATTERN")]
    pub path_dir: Option<String>,

    /// Number of tasks per pool submission (useful for very long inputs)
    #[arg(long)]
    pub chunksize: Option<usize>,

    /// Number of workers (default: number of CPUs)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Input files are xz-compressed
    #[arg(long = "input-xz")]
    pub input_xz: bool,

    /// Compress annotator output with xz
    #[arg(long = "output-xz")]
    pub output_xz: bool,

    // === Tool Options ===
    /// Annotator binary (default: udpipe)
    #[arg(long, env = "ANNOBATCH_ANNOTATOR")]
    pub annotator: Option<String>,

    /// Decompressor binary (default: xzcat)
    #[arg(long)]
    pub decompressor: Option<String>,

    /// Compressor binary (default: xz)
    #[arg(long)]
    pub compressor: Option<String>,

    // === Error Handling Options ===
    /// Only fail the run on errors of uncompressed file-to-file pipelines
    #[arg(long)]
    pub best_effort: bool,

    // === Configuration File ===
    /// TOML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Dry run - print planned commands without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    ///
    /// Required flags may come from the config file instead, so only
    /// checks that make sense on the command line alone live here.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == Some(0) {
            anyhow::bail!("workers must be at least 1");
        }
        if self.chunksize == Some(0) {
            anyhow::bail!("chunksize must be at least 1");
        }
        if self.config.is_none() {
            if self.args.is_empty() {
                anyhow::bail!("the following required argument was not provided: --arg");
            }
            if self.model.is_none() {
                anyhow::bail!("the following required argument was not provided: --model");
            }
            if self.path_dir.is_none() {
                anyhow::bail!("the following required argument was not provided: --path_dir");
            }
        }
        Ok(())
    }
}
