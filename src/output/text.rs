//! Human-readable text output

use crate::config::JobConfig;
use crate::dispatcher::DispatchSummary;
use crate::pipeline::{PipelinePlan, PipelineShape};
use std::fmt::Write;

const RULE: &str = "═══════════════════════════════════════════════════════════";

/// Render the resolved job configuration
pub fn format_configuration(config: &JobConfig) -> String {
    let shape = PipelineShape::select(config.input_compressed, config.output_compressed);
    let mut out = String::new();

    let _ = writeln!(out, "Configuration:");
    let _ = writeln!(out, "  Pattern:     {}", config.pattern);
    let _ = writeln!(out, "  Model:       {}", config.model.display());
    let _ = writeln!(out, "  Arguments:   {}", config.args.join(" "));
    let plural = if shape.stage_count() == 1 { "" } else { "s" };
    let _ = writeln!(out, "  Pipeline:    {} ({} stage{})", shape, shape.stage_count(), plural);
    match config.workers {
        Some(n) => {
            let _ = writeln!(out, "  Workers:     {}", n);
        }
        None => {
            let _ = writeln!(out, "  Workers:     {} (all CPUs)", config.effective_workers());
        }
    }
    let _ = writeln!(out, "  Chunk size:  {}", config.effective_chunk_size());
    let _ = writeln!(out, "  Failures:    {}", config.failure_policy);
    let _ = writeln!(out, "Tools:");
    let _ = writeln!(
        out,
        "  Annotator:   {} {}",
        config.tools.annotator, config.tools.immediate_flag
    );
    if shape.decompresses() {
        let _ = writeln!(out, "  Decompress:  {}", config.tools.decompressor);
    }
    if shape.compresses() {
        let _ = writeln!(out, "  Compress:    {}", config.tools.compressor);
    }

    out
}

/// Print the resolved job configuration
pub fn print_configuration(config: &JobConfig) {
    print!("{}", format_configuration(config));
}

/// Print one planned command chain (dry run)
pub fn print_plan(plan: &PipelinePlan) {
    println!("  {}", plan);
}

/// Render the end-of-run summary
pub fn format_summary(summary: &DispatchSummary) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "                    RUN SUMMARY");
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Elapsed Time: {:.3}s", summary.elapsed.as_secs_f64());
    let _ = writeln!(out, "Files:");
    let _ = writeln!(out, "  Submitted: {} ({} batches)", summary.submitted, summary.batches);
    let _ = writeln!(out, "  Succeeded: {}", summary.succeeded);
    if summary.failed > 0 {
        let _ = writeln!(out, "  Failed:    {}", summary.failed);
    }
    if summary.skipped > 0 {
        let _ = writeln!(out, "  Skipped:   {}", summary.skipped);
    }
    if summary.ignored_stage_failures > 0 {
        let _ = writeln!(
            out,
            "  Warning:   {} stage failure(s) ignored (best-effort policy); outputs may be incomplete",
            summary.ignored_stage_failures
        );
    }
    let _ = writeln!(out, "{}", RULE);

    out
}

/// Print the end-of-run summary
pub fn print_summary(summary: &DispatchSummary) {
    print!("{}", format_summary(summary));
}
