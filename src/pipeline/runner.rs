//! Pipeline execution
//!
//! Spawns the stages of a [`PipelinePlan`] left to right, handing each
//! child's stdout pipe to the next child's stdin. When the chain ends in a
//! compressor, its stdout is pointed at the (created or truncated) output
//! file before anything is started. The runner then blocks on the terminal
//! stage and reaps every upstream stage, so no child outlives the task.

use super::{PipelineError, PipelinePlan, PipelineShape, Sink, StageRole, StageSpec};
use crate::config::FailurePolicy;
use crate::task::FileTask;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use tracing::{debug, warn};

/// Result of one successfully processed task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub shape: PipelineShape,
    pub output: PathBuf,
    /// Stages that exited non-zero but were not treated as errors (best-effort only)
    pub ignored_failures: Vec<StageRole>,
}

/// Runs one task's process chain
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineRunner;

impl PipelineRunner {
    pub fn new() -> Self {
        Self
    }

    /// Plan and execute the chain for `task`
    pub fn run(&self, task: &FileTask) -> Result<PipelineReport, PipelineError> {
        let plan = PipelinePlan::build(task.path(), task.config());
        self.execute(&plan, task.config().failure_policy)
    }

    /// Execute an already built plan
    pub fn execute(
        &self,
        plan: &PipelinePlan,
        policy: FailurePolicy,
    ) -> Result<PipelineReport, PipelineError> {
        debug!(
            input = %plan.input.display(),
            shape = %plan.shape,
            chain = %plan,
            "starting pipeline"
        );

        let statuses = match spawn_and_wait(plan) {
            Ok(statuses) => statuses,
            Err(e) => {
                if policy == FailurePolicy::Strict && output_touched(plan, &e) {
                    remove_partial_output(&plan.output);
                }
                return Err(e);
            }
        };

        // Downstream first: an upstream stage dying of a broken pipe is a
        // consequence of its reader failing, not the cause.
        let failed: Vec<(&StageSpec, &ExitStatus)> = plan
            .stages
            .iter()
            .zip(&statuses)
            .filter(|(_, status)| !status.success())
            .collect();

        if let Some((stage, status)) = failed.last() {
            if is_checked(plan.shape, policy) {
                if policy == FailurePolicy::Strict {
                    remove_partial_output(&plan.output);
                }
                return Err(PipelineError::StageFailed {
                    role: stage.role,
                    program: stage.program.clone(),
                    input: plan.input.clone(),
                    code: status.code(),
                });
            }
        }

        let mut ignored_failures = Vec::with_capacity(failed.len());
        for (stage, status) in failed {
            warn!(
                input = %plan.input.display(),
                stage = %stage.role,
                program = %stage.program,
                status = %status,
                "stage failed; ignored under best-effort policy"
            );
            ignored_failures.push(stage.role);
        }

        debug!(output = %plan.output.display(), "pipeline finished");
        Ok(PipelineReport {
            shape: plan.shape,
            output: plan.output.clone(),
            ignored_failures,
        })
    }
}

/// Whether non-zero stage exits become errors
///
/// Best-effort only checks the plain file-to-file invocation.
fn is_checked(shape: PipelineShape, policy: FailurePolicy) -> bool {
    match policy {
        FailurePolicy::Strict => true,
        FailurePolicy::BestEffort => shape == PipelineShape::PlainToPlain,
    }
}

/// Whether this run may have written to the output before `err` happened
///
/// The sink file is created before any stage starts. An annotator that
/// writes its own outfile can only have touched it if it was spawned, and
/// it is always the last stage in those shapes.
fn output_touched(plan: &PipelinePlan, err: &PipelineError) -> bool {
    match err {
        PipelineError::Sink { .. } => false,
        PipelineError::Spawn { .. } => plan.sink == Sink::LastStageStdout,
        PipelineError::Wait { .. } | PipelineError::StageFailed { .. } => true,
    }
}

/// Spawn every stage, then wait for all of them; statuses are in chain order
fn spawn_and_wait(plan: &PipelinePlan) -> Result<Vec<ExitStatus>, PipelineError> {
    let mut sink = match plan.sink {
        Sink::LastStageStdout => Some(File::create(&plan.output).map_err(|source| {
            PipelineError::Sink {
                path: plan.output.clone(),
                source,
            }
        })?),
        Sink::AnnotatorOutfile => None,
    };

    let last = plan.stages.len() - 1;
    let mut children: Vec<(&StageSpec, Child)> = Vec::with_capacity(plan.stages.len());
    let mut upstream: Option<ChildStdout> = None;

    for (i, stage) in plan.stages.iter().enumerate() {
        let stdin = match upstream.take() {
            Some(pipe) => Stdio::from(pipe),
            None => Stdio::null(),
        };
        let stdout = if i < last {
            Stdio::piped()
        } else {
            match sink.take() {
                Some(file) => Stdio::from(file),
                None => Stdio::inherit(),
            }
        };

        debug!(stage = %stage.role, command = %stage, "spawning stage");
        let mut child = match command(stage).stdin(stdin).stdout(stdout).spawn() {
            Ok(child) => child,
            Err(source) => {
                abandon(children.into_iter().map(|(_, child)| child));
                return Err(PipelineError::Spawn {
                    role: stage.role,
                    program: stage.program.clone(),
                    input: plan.input.clone(),
                    source,
                });
            }
        };
        upstream = child.stdout.take();
        children.push((stage, child));
    }

    // Terminal stage first: its exit implies upstream writers are done
    let mut statuses = Vec::with_capacity(children.len());
    while let Some((stage, mut child)) = children.pop() {
        match child.wait() {
            Ok(status) => statuses.push(status),
            Err(source) => {
                abandon(children.into_iter().map(|(_, child)| child));
                return Err(PipelineError::Wait {
                    role: stage.role,
                    program: stage.program.clone(),
                    input: plan.input.clone(),
                    source,
                });
            }
        }
    }
    statuses.reverse();

    Ok(statuses)
}

fn command(stage: &StageSpec) -> Command {
    let mut cmd = Command::new(&stage.program);
    cmd.args(&stage.args).stderr(Stdio::inherit());
    cmd
}

/// Kill and reap stages that are still running when the chain is given up
fn abandon(children: impl IntoIterator<Item = Child>) {
    for mut child in children {
        let _ = child.kill();
        let _ = child.wait();
    }
}

fn remove_partial_output(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed partial output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial output"),
    }
}
