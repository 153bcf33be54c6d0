//! annobatch CLI entry point

use anyhow::{Context, Result};
use annobatch::config::{cli::Cli, toml::load_job_config, validator::validate_config};
use annobatch::dispatcher::DispatchError;
use annobatch::output::text;
use annobatch::pipeline::PipelinePlan;
use annobatch::{JobConfig, TaskBuilder};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();
    cli.validate()?;

    init_logging(cli.debug);

    // Build and validate configuration
    let config = load_job_config(&cli).context("Failed to build job configuration")?;
    validate_config(&config).context("Configuration validation failed")?;

    println!("annobatch v{}", env!("CARGO_PKG_VERSION"));
    println!();
    text::print_configuration(&config);
    println!();

    if cli.dry_run {
        return dry_run(Arc::new(config));
    }

    run(Arc::new(config))
}

/// Logging goes to stderr; `RUST_LOG` overrides `--debug`
fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

/// Print every task's command chain without running anything
fn dry_run(config: Arc<JobConfig>) -> Result<()> {
    println!("Planned pipelines:");
    let mut count = 0usize;
    for task in TaskBuilder::new(Arc::clone(&config)).tasks()? {
        text::print_plan(&PipelinePlan::build(task.path(), task.config()));
        count += 1;
    }
    println!();
    println!("Dry run mode - {} file(s) matched, nothing executed", count);
    Ok(())
}

fn run(config: Arc<JobConfig>) -> Result<()> {
    info!(pattern = %config.pattern, "starting run");

    match annobatch::run_job(config) {
        Ok(summary) => {
            text::print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            if let Some(DispatchError::TaskFailed { summary, .. }) =
                e.downcast_ref::<DispatchError>()
            {
                text::print_summary(summary);
            }
            Err(e.context("Annotation run aborted"))
        }
    }
}
