//! Wave scheduler
//!
//! The task list grows every item's production target one block at a time:
//! wave `k` holds one task per item with target `min((k + 1) * block,
//! total)`. Waves are submitted one after another and each is drained
//! before the next starts, so every item finishes block `k` before any item
//! starts block `k + 1`, and no directory ever has two concurrent writers.
//!
//! Per-task failures (including panics) never stop sibling tasks. They are
//! collected, written to the error log once the run drains, and reported as
//! a single [`Error::AggregateExecution`].

use crate::driver::DriveOutcome;
use crate::error::{Error, Result};
use crate::workdir::WorkItem;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

/// One scheduled drive of an item to a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Item to drive
    pub item: WorkItem,
    /// Production events per particle to reach
    pub target: u64,
    /// Wave index
    pub wave: usize,
}

/// Executes one task synchronously on a worker
///
/// Implemented by [`RunDriver`](crate::driver::RunDriver); tests substitute
/// their own executors.
pub trait TaskExecutor: Send + Sync + 'static {
    /// Drive the task's item to its target
    ///
    /// # Errors
    /// Any per-item failure
    fn execute(&self, task: &Task) -> Result<DriveOutcome>;
}

impl<F> TaskExecutor for F
where
    F: Fn(&Task) -> Result<DriveOutcome> + Send + Sync + 'static,
{
    fn execute(&self, task: &Task) -> Result<DriveOutcome> {
        self(task)
    }
}

/// Cumulative targets growing by `block` up to `total`, last one clipped
///
/// # Errors
/// `Configuration` for a zero block with a non-zero total
pub fn block_targets(total: u64, block: u64) -> Result<Vec<u64>> {
    if total == 0 {
        return Ok(Vec::new());
    }
    if block == 0 {
        return Err(Error::Configuration(
            "block_events_per_particle must be positive".into(),
        ));
    }
    let mut targets = Vec::new();
    let mut reached = 0u64;
    while reached < total {
        reached = reached.saturating_add(block).min(total);
        targets.push(reached);
    }
    Ok(targets)
}

/// Wave-major task list: every item for the first target, then the next
#[must_use]
pub fn build_tasks(items: &[WorkItem], targets: &[u64]) -> Vec<Task> {
    targets
        .iter()
        .enumerate()
        .flat_map(|(wave, &target)| {
            items.iter().map(move |item| Task {
                item: item.clone(),
                target,
                wave,
            })
        })
        .collect()
}

/// A task that did not complete
#[derive(Debug)]
pub struct TaskFailure {
    /// The failed task
    pub task: Task,
    /// Why it failed
    pub error: Error,
}

/// Counters of a drained run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tasks handed to the executor
    pub executed: usize,
    /// Tasks that reached their target
    pub completed: usize,
    /// Tasks whose state was declined by setup
    pub skipped: usize,
    /// Waves processed
    pub waves: usize,
}

#[derive(Default)]
struct Tally {
    summary: RunSummary,
    failures: Vec<TaskFailure>,
    retired: HashSet<PathBuf>,
    planned: usize,
}

impl Tally {
    fn record(&mut self, task: Task, result: Result<DriveOutcome>) {
        self.summary.executed += 1;
        match result {
            Ok(DriveOutcome::Complete { .. }) => self.summary.completed += 1,
            Ok(DriveOutcome::Skipped) => {
                self.summary.skipped += 1;
                self.retired.insert(task.item.dir.clone());
            }
            Err(e) => {
                if self.failures.is_empty() {
                    error!("{} failed: {}", task.item.label(), e);
                } else {
                    warn!("{} failed: {}", task.item.label(), e);
                }
                self.retired.insert(task.item.dir.clone());
                self.failures.push(TaskFailure { task, error: e });
            }
        }
    }

    fn is_retired(&self, task: &Task) -> bool {
        self.retired.contains(&task.item.dir)
    }

    fn report_progress(&self) {
        info!(
            "{}/{} tasks done, {} failed",
            self.summary.executed,
            self.planned,
            self.failures.len()
        );
    }
}

/// Bounded worker pool running tasks wave by wave
pub struct Scheduler {
    executor: Arc<dyn TaskExecutor>,
    processes: usize,
    poll_interval: Duration,
    error_log: PathBuf,
}

impl Scheduler {
    /// Create a scheduler
    #[must_use]
    pub fn new(
        executor: Arc<dyn TaskExecutor>,
        processes: usize,
        error_log: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executor,
            processes: processes.max(1),
            poll_interval: Duration::from_millis(500),
            error_log: error_log.into(),
        }
    }

    /// With progress report interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Run every task
    ///
    /// An item whose task failed or was skipped gets no further tasks in
    /// later waves.
    ///
    /// # Errors
    /// `AggregateExecution` if any task failed, after all others finished
    pub async fn run(&self, tasks: Vec<Task>) -> Result<RunSummary> {
        let total = tasks.len();
        let waves = split_waves(tasks);
        info!(
            "running {} tasks in {} waves with {} process(es)",
            total,
            waves.len(),
            self.processes
        );

        let mut tally = Tally {
            planned: total,
            ..Tally::default()
        };
        let mut last_report = Instant::now();
        for wave in waves {
            let scheduled = wave.len();
            let wave: Vec<Task> = wave.into_iter().filter(|t| !tally.is_retired(t)).collect();
            // Retired tasks never run, so they leave the denominator
            tally.planned -= scheduled - wave.len();
            if wave.is_empty() {
                continue;
            }
            tally.summary.waves += 1;
            if self.processes == 1 {
                for task in wave {
                    let result = execute_caught(self.executor.as_ref(), &task);
                    tally.record(task, result);
                    if last_report.elapsed() >= self.poll_interval {
                        tally.report_progress();
                        last_report = Instant::now();
                    }
                }
            } else {
                self.run_wave(wave, &mut tally).await?;
            }
        }

        if tally.failures.is_empty() {
            info!(
                "run finished: {} completed, {} skipped",
                tally.summary.completed, tally.summary.skipped
            );
            return Ok(tally.summary);
        }

        write_error_log(&self.error_log, &tally.failures)?;
        Err(Error::AggregateExecution {
            failures: tally.failures.len(),
            log: self.error_log.clone(),
        })
    }

    async fn run_wave(&self, wave: Vec<Task>, tally: &mut Tally) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.processes));
        let (tx, mut rx) = mpsc::channel(wave.len());

        let executor = Arc::clone(&self.executor);
        let submitter = tokio::spawn(async move {
            for task in wave {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let executor = Arc::clone(&executor);
                let tx = tx.clone();
                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    let result = execute_caught(executor.as_ref(), &task);
                    // Receiver outlives every worker
                    let _ = tx.blocking_send((task, result));
                });
            }
        });

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some((task, result)) => tally.record(task, result),
                    None => break,
                },
                _ = ticker.tick() => tally.report_progress(),
            }
        }

        submitter
            .await
            .map_err(|e| Error::TaskPanicked(format!("task submission: {e}")))
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("processes", &self.processes)
            .field("poll_interval", &self.poll_interval)
            .field("error_log", &self.error_log)
            .finish_non_exhaustive()
    }
}

fn split_waves(tasks: Vec<Task>) -> Vec<Vec<Task>> {
    let mut waves: Vec<Vec<Task>> = Vec::new();
    for task in tasks {
        match waves.last_mut() {
            Some(current) if current.first().is_some_and(|t| t.wave == task.wave) => {
                current.push(task);
            }
            _ => waves.push(vec![task]),
        }
    }
    waves
}

fn execute_caught(executor: &dyn TaskExecutor, task: &Task) -> Result<DriveOutcome> {
    catch_unwind(AssertUnwindSafe(|| executor.execute(task))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(Error::TaskPanicked(format!("{}: {message}", task.item.label())))
    })
}

fn write_error_log(path: &Path, failures: &[TaskFailure]) -> Result<()> {
    let mut text = String::new();
    for failure in failures {
        let _ = writeln!(
            text,
            "=== {} restart {} (target {}) in {} ===\n{}\n",
            failure.task.item.state,
            failure.task.item.restart,
            failure.task.target,
            failure.task.item.dir.display(),
            failure.error
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    std::fs::write(path, text).map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{State, StateValue};
    use parking_lot::Mutex;

    fn item(i: i64) -> WorkItem {
        WorkItem {
            state: State::from_pairs([("i", StateValue::Int(i))]),
            restart: 0,
            dir: PathBuf::from(format!("/nowhere/i_{i}_0")),
        }
    }

    fn complete() -> Result<DriveOutcome> {
        Ok(DriveOutcome::Complete {
            stages_run: 1,
            particle_events: 1.0,
        })
    }

    #[test]
    fn block_growth_clips_the_last_wave() {
        assert_eq!(block_targets(1000, 300).unwrap(), vec![300, 600, 900, 1000]);
        assert_eq!(block_targets(900, 300).unwrap(), vec![300, 600, 900]);
        assert!(block_targets(0, 300).unwrap().is_empty());
        assert!(block_targets(0, 0).unwrap().is_empty());
        assert!(block_targets(10, 0).unwrap_err().is_configuration());
    }

    #[test]
    fn tasks_are_wave_major() {
        let items = [item(1), item(2)];
        let tasks = build_tasks(&items, &[300, 600]);
        let order: Vec<_> = tasks.iter().map(|t| (t.wave, t.target, t.item.label())).collect();
        assert_eq!(
            order,
            vec![
                (0, 300, "i_1_0".to_string()),
                (0, 300, "i_2_0".to_string()),
                (1, 600, "i_1_0".to_string()),
                (1, 600, "i_2_0".to_string()),
            ]
        );
        assert_eq!(split_waves(tasks).len(), 2);
    }

    #[tokio::test]
    async fn sequential_mode_runs_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let executor = move |task: &Task| {
            log.lock().push((task.wave, task.item.label()));
            complete()
        };
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(Arc::new(executor), 1, dir.path().join("error.log"));

        let tasks = build_tasks(&[item(1), item(2)], &[1, 2]);
        let summary = scheduler.run(tasks).await.unwrap();

        assert_eq!(summary.completed, 4);
        assert_eq!(summary.waves, 2);
        assert_eq!(seen.lock()[0], (0, "i_1_0".to_string()));
        assert_eq!(seen.lock()[3], (1, "i_2_0".to_string()));
        assert!(!dir.path().join("error.log").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panics_become_collected_failures() {
        let executor = |task: &Task| {
            if task.item.label() == "i_2_0" {
                panic!("simulated crash");
            }
            complete()
        };
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("error.log");
        let scheduler = Scheduler::new(Arc::new(executor), 3, &log)
            .with_poll_interval(Duration::from_millis(5));

        let tasks = build_tasks(&[item(1), item(2), item(3)], &[1, 2]);
        match scheduler.run(tasks).await {
            Err(Error::AggregateExecution { failures, log: path }) => {
                assert_eq!(failures, 1);
                assert_eq!(path, log);
            }
            other => panic!("expected aggregate failure, got {other:?}"),
        }
        let text = std::fs::read_to_string(&log).unwrap();
        assert!(text.contains("simulated crash"));
        assert!(text.contains("i_2_0"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn skipped_items_leave_later_waves() {
        let calls = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&calls);
        let executor = move |task: &Task| {
            *counter.lock() += 1;
            if task.item.label() == "i_1_0" {
                Ok(DriveOutcome::Skipped)
            } else {
                complete()
            }
        };
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(Arc::new(executor), 2, dir.path().join("e.log"));

        let summary = scheduler
            .run(build_tasks(&[item(1), item(2)], &[1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.completed, 3);
        assert_eq!(*calls.lock(), 4);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn sequential_mode_reports_progress_to_completion() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let executor = |task: &Task| {
            std::thread::sleep(Duration::from_millis(3));
            if task.item.label() == "i_2_0" {
                Ok(DriveOutcome::Skipped)
            } else {
                complete()
            }
        };
        let dir = tempfile::tempdir().unwrap();
        let summary = Scheduler::new(Arc::new(executor), 1, dir.path().join("e.log"))
            .with_poll_interval(Duration::from_millis(1))
            .run(build_tasks(&[item(1), item(2), item(3)], &[1, 2]))
            .await
            .unwrap();
        assert_eq!(summary.executed, 5);

        let text = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert!(text.contains("1/6 tasks done"), "log was:\n{text}");
        // the skipped item's second task is dropped from the total
        assert!(text.contains("5/5 tasks done, 0 failed"), "log was:\n{text}");
    }
}
