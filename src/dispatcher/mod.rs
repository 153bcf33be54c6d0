//! Worker pool dispatch
//!
//! The [`Dispatcher`] owns a fixed-size rayon pool and pushes every
//! [`FileTask`] through a [`TaskRunner`]. Tasks are grouped into batches of
//! `chunk_size` before submission; a batch is the unit a worker picks up.
//!
//! # Lifecycle
//!
//! `Idle → PoolStarted → TasksSubmitted → Draining → PoolClosed`
//!
//! 1. **PoolStarted**: the pool is built with N worker threads
//! 2. **TasksSubmitted**: the task stream has been consumed and every batch handed to the pool
//! 3. **Draining**: no more submissions; waiting for in-flight batches
//! 4. **PoolClosed**: terminal, reached whether or not tasks failed
//!
//! # Failures
//!
//! The first failed task aborts the run. Batches already running finish
//! their current task, their remaining tasks are skipped, and no new batch
//! is submitted. The failure is returned together with the run summary.
//!
//! Each worker runs one task at a time, so at most N pipelines (and hence
//! at most N annotator processes) are alive at once.

use crate::config::JobConfig;
use crate::pipeline::{PipelineError, PipelineReport, PipelineRunner};
use crate::task::FileTask;
use crossbeam::channel;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

/// Something that can process one file task
///
/// Implemented by [`PipelineRunner`]; tests substitute an in-memory runner.
pub trait TaskRunner: Sync {
    fn run_task(&self, task: &FileTask) -> Result<PipelineReport, PipelineError>;
}

impl TaskRunner for PipelineRunner {
    fn run_task(&self, task: &FileTask) -> Result<PipelineReport, PipelineError> {
        self.run(task)
    }
}

/// Dispatcher lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    PoolStarted,
    TasksSubmitted,
    Draining,
    PoolClosed,
}

impl DispatchState {
    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(self, next: DispatchState) -> bool {
        use DispatchState::*;
        matches!(
            (self, next),
            (Idle, PoolStarted)
                | (PoolStarted, TasksSubmitted)
                | (TasksSubmitted, Draining)
                | (Draining, PoolClosed)
        )
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchState::Idle => "idle",
            DispatchState::PoolStarted => "pool-started",
            DispatchState::TasksSubmitted => "tasks-submitted",
            DispatchState::Draining => "draining",
            DispatchState::PoolClosed => "pool-closed",
        };
        f.write_str(name)
    }
}

/// Counters for one dispatch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Tasks handed to the pool
    pub submitted: usize,
    /// Batches handed to the pool
    pub batches: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Submitted tasks not run because the run was aborted
    pub skipped: usize,
    /// Non-zero stage exits tolerated by the best-effort policy
    pub ignored_stage_failures: usize,
    pub elapsed: Duration,
}

/// Dispatcher errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to build worker pool with {workers} workers: {source}")]
    PoolBuild {
        workers: usize,
        #[source]
        source: rayon::ThreadPoolBuildError,
    },

    #[error("task failed: {source}")]
    TaskFailed {
        #[source]
        source: PipelineError,
        summary: DispatchSummary,
    },

    #[error("invalid dispatcher transition {from} -> {to}")]
    InvalidTransition {
        from: DispatchState,
        to: DispatchState,
    },
}

enum TaskOutcome {
    Succeeded(PipelineReport),
    Failed(PipelineError),
    Skipped,
}

/// Runs file tasks on a bounded worker pool
pub struct Dispatcher<R: TaskRunner> {
    runner: R,
    workers: usize,
    chunk_size: usize,
    state: DispatchState,
}

impl Dispatcher<PipelineRunner> {
    /// Pipeline dispatcher sized from the job configuration
    pub fn from_config(config: &JobConfig) -> Self {
        Self::new(
            PipelineRunner::new(),
            config.effective_workers(),
            config.effective_chunk_size(),
        )
    }
}

impl<R: TaskRunner> Dispatcher<R> {
    /// Zero `workers` or `chunk_size` is treated as 1
    pub fn new(runner: R, workers: usize, chunk_size: usize) -> Self {
        Self {
            runner,
            workers: workers.max(1),
            chunk_size: chunk_size.max(1),
            state: DispatchState::Idle,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Process every task and shut the pool down
    ///
    /// Blocks until all submitted batches have finished. A dispatcher runs
    /// once; calling this again fails with `InvalidTransition`.
    pub fn run<I>(&mut self, tasks: I) -> Result<DispatchSummary, DispatchError>
    where
        I: IntoIterator<Item = FileTask>,
        I::IntoIter: Send,
    {
        let start = Instant::now();
        advance(&mut self.state, DispatchState::PoolStarted)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("annobatch-worker-{}", i))
            .build()
            .map_err(|source| DispatchError::PoolBuild {
                workers: self.workers,
                source,
            })?;
        info!(workers = self.workers, chunk_size = self.chunk_size, "worker pool started");

        let (tx, rx) = channel::unbounded::<TaskOutcome>();
        let abort = AtomicBool::new(false);
        let runner = &self.runner;
        let chunk_size = self.chunk_size;
        let state = &mut self.state;
        let mut tasks = tasks.into_iter();

        let (submitted, batches) = pool.scope(|scope| -> Result<(usize, usize), DispatchError> {
            let mut submitted = 0;
            let mut batches = 0;

            loop {
                if abort.load(Ordering::Relaxed) {
                    debug!("run aborted; not submitting further batches");
                    break;
                }
                let batch: Vec<FileTask> = tasks.by_ref().take(chunk_size).collect();
                if batch.is_empty() {
                    break;
                }

                submitted += batch.len();
                batches += 1;
                let tx = tx.clone();
                let abort = &abort;
                scope.spawn(move |_| run_batch(runner, batch, abort, &tx));
            }

            advance(state, DispatchState::TasksSubmitted)?;
            advance(state, DispatchState::Draining)?;
            Ok((submitted, batches))
        })?;
        drop(tx);
        drop(pool);
        advance(&mut self.state, DispatchState::PoolClosed)?;

        let mut summary = DispatchSummary {
            submitted,
            batches,
            ..DispatchSummary::default()
        };
        let mut first_error = None;
        for outcome in rx.iter() {
            match outcome {
                TaskOutcome::Succeeded(report) => {
                    summary.succeeded += 1;
                    summary.ignored_stage_failures += report.ignored_failures.len();
                }
                TaskOutcome::Failed(e) => {
                    summary.failed += 1;
                    if first_error.is_none() {
                        first_error = Some(e);
                    } else {
                        error!(error = %e, "additional task failure");
                    }
                }
                TaskOutcome::Skipped => summary.skipped += 1,
            }
        }
        summary.elapsed = start.elapsed();

        match first_error {
            Some(source) => Err(DispatchError::TaskFailed { source, summary }),
            None => Ok(summary),
        }
    }
}

fn advance(state: &mut DispatchState, next: DispatchState) -> Result<(), DispatchError> {
    if !state.can_transition_to(next) {
        return Err(DispatchError::InvalidTransition { from: *state, to: next });
    }
    debug!(from = %state, to = %next, "dispatcher transition");
    *state = next;
    Ok(())
}

fn run_batch<R: TaskRunner>(
    runner: &R,
    batch: Vec<FileTask>,
    abort: &AtomicBool,
    tx: &channel::Sender<TaskOutcome>,
) {
    for task in batch {
        if abort.load(Ordering::Relaxed) {
            let _ = tx.send(TaskOutcome::Skipped);
            continue;
        }
        let outcome = match runner.run_task(&task) {
            Ok(report) => {
                debug!(
                    input = %task.path().display(),
                    output = %report.output.display(),
                    "task done"
                );
                TaskOutcome::Succeeded(report)
            }
            Err(e) => {
                error!(input = %task.path().display(), error = %e, "task failed; aborting run");
                abort.store(true, Ordering::Relaxed);
                TaskOutcome::Failed(e)
            }
        };
        // Receiver outlives the pool scope
        let _ = tx.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FailurePolicy, ToolConfig};
    use crate::pipeline::StageRole;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    /// In-memory runner: records what it saw and how many ran at once
    #[derive(Default)]
    struct MockRunner {
        delay: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl MockRunner {
        fn with_delay(ms: u64) -> Self {
            Self {
                delay: Duration::from_millis(ms),
                ..Self::default()
            }
        }
    }

    impl TaskRunner for MockRunner {
        fn run_task(&self, task: &FileTask) -> Result<PipelineReport, PipelineError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.seen.lock().unwrap().push(task.path().to_path_buf());
            self.active.fetch_sub(1, Ordering::SeqCst);

            if task.path().to_string_lossy().contains("bad") {
                return Err(PipelineError::StageFailed {
                    role: StageRole::Annotate,
                    program: "annotator".to_string(),
                    input: task.path().to_path_buf(),
                    code: Some(1),
                });
            }
            Ok(PipelineReport {
                shape: task.shape(),
                output: task.output_path(),
                ignored_failures: vec![],
            })
        }
    }

    fn config() -> Arc<JobConfig> {
        Arc::new(JobConfig {
            args: vec!["--tag".to_string()],
            model: PathBuf::from("m"),
            pattern: String::new(),
            input_compressed: false,
            output_compressed: false,
            workers: None,
            chunk_size: None,
            tools: ToolConfig::default(),
            failure_policy: FailurePolicy::Strict,
        })
    }

    fn tasks(names: &[String]) -> Vec<FileTask> {
        let config = config();
        names
            .iter()
            .map(|n| FileTask::new(PathBuf::from(n), Arc::clone(&config)))
            .collect()
    }

    fn names(k: usize) -> Vec<String> {
        (0..k).map(|i| format!("file-{}.txt", i)).collect()
    }

    #[test]
    fn test_transitions() {
        use DispatchState::*;
        assert!(Idle.can_transition_to(PoolStarted));
        assert!(PoolStarted.can_transition_to(TasksSubmitted));
        assert!(TasksSubmitted.can_transition_to(Draining));
        assert!(Draining.can_transition_to(PoolClosed));

        assert!(!Idle.can_transition_to(Draining));
        assert!(!Draining.can_transition_to(TasksSubmitted));
        for next in [Idle, PoolStarted, TasksSubmitted, Draining, PoolClosed] {
            assert!(!PoolClosed.can_transition_to(next));
        }
    }

    #[test]
    fn test_every_task_runs_once() {
        for (workers, chunk) in [(1, 1), (4, 1), (num_cpus::get(), 1), (3, 5), (2, 100)] {
            let mut dispatcher = Dispatcher::new(MockRunner::default(), workers, chunk);
            let summary = dispatcher.run(tasks(&names(23))).unwrap();

            assert_eq!(summary.submitted, 23);
            assert_eq!(summary.succeeded, 23);
            assert_eq!(summary.failed, 0);
            assert_eq!(summary.skipped, 0);
            assert_eq!(dispatcher.state(), DispatchState::PoolClosed);

            let seen = dispatcher.runner.seen.lock().unwrap();
            let unique: HashSet<&PathBuf> = seen.iter().collect();
            assert_eq!(seen.len(), 23);
            assert_eq!(unique.len(), 23);
        }
    }

    #[test]
    fn test_batches() {
        let mut dispatcher = Dispatcher::new(MockRunner::default(), 2, 5);
        let summary = dispatcher.run(tasks(&names(12))).unwrap();
        assert_eq!(summary.batches, 3);

        let mut dispatcher = Dispatcher::new(MockRunner::default(), 2, 1);
        let summary = dispatcher.run(tasks(&names(12))).unwrap();
        assert_eq!(summary.batches, 12);
    }

    #[test]
    fn test_worker_bound() {
        let mut dispatcher = Dispatcher::new(MockRunner::with_delay(15), 3, 1);
        dispatcher.run(tasks(&names(24))).unwrap();

        let max = dispatcher.runner.max_active.load(Ordering::SeqCst);
        assert!(max <= 3, "{} tasks ran concurrently with 3 workers", max);
        assert!(max >= 1);
    }

    #[test]
    fn test_empty_input() {
        let mut dispatcher = Dispatcher::new(MockRunner::default(), 4, 2);
        let summary = dispatcher.run(Vec::new()).unwrap();
        assert_eq!(summary.submitted, 0);
        assert_eq!(summary.batches, 0);
        assert_eq!(dispatcher.state(), DispatchState::PoolClosed);
    }

    #[test]
    fn test_failure_aborts_run() {
        let mut input = vec!["bad-0.txt".to_string()];
        input.extend(names(9));

        // One worker, one batch: everything after the failure is skipped
        let mut dispatcher = Dispatcher::new(MockRunner::default(), 1, 10);
        let err = dispatcher.run(tasks(&input)).unwrap_err();

        match err {
            DispatchError::TaskFailed { source, summary } => {
                assert_eq!(source.input(), Some(std::path::Path::new("bad-0.txt")));
                assert_eq!(summary.failed, 1);
                assert_eq!(summary.succeeded, 0);
                assert_eq!(summary.skipped, 9);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(dispatcher.state(), DispatchState::PoolClosed);
    }

    #[test]
    fn test_dispatcher_runs_once() {
        let mut dispatcher = Dispatcher::new(MockRunner::default(), 1, 1);
        dispatcher.run(tasks(&names(2))).unwrap();
        let err = dispatcher.run(tasks(&names(2))).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidTransition {
                from: DispatchState::PoolClosed,
                to: DispatchState::PoolStarted
            }
        ));
    }

    #[test]
    fn test_from_config() {
        let mut job = (*config()).clone();
        job.workers = Some(7);
        job.chunk_size = Some(3);
        let dispatcher = Dispatcher::from_config(&job);
        assert_eq!(dispatcher.workers(), 7);
        assert_eq!(dispatcher.chunk_size(), 3);
        assert_eq!(dispatcher.state(), DispatchState::Idle);
    }
}
