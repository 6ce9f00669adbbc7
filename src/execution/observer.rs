use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::error::GraphError;

/// Lifecycle and resource events of a run, in the order they happen.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Bindings were accepted and the plan was wired.
    RunStarted { nodes: usize, sources: Vec<String> },
    /// A sort wrote its `run`-th spill file.
    SpillWritten { run: usize, rows: usize },
    /// A sort starts a merge pass over `runs` spilled runs. Sorts with more runs than
    /// `ExecutionOptions::merge_fan_in` report one event per pass.
    MergeStarted { runs: usize },
    /// The output stream ended normally.
    RunFinished {
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
    /// The run was rejected or its output ended with an error.
    RunFailed { error: GraphError },
}

impl fmt::Display for ExecutionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunStarted { nodes, sources } => {
                write!(f, "run started: {nodes} nodes, sources {sources:?}")
            }
            Self::SpillWritten { run, rows } => write!(f, "spilled run {run} ({rows} rows)"),
            Self::MergeStarted { runs } => write!(f, "merging {runs} spilled runs"),
            Self::RunFinished { metrics, .. } => write!(f, "run finished: {metrics}"),
            Self::RunFailed { error } => write!(f, "run failed: {error}"),
        }
    }
}

/// Receives [`ExecutionEvent`]s. Called on the thread that pulls the run's output.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Logs every event to stderr, one line each.
#[derive(Default)]
pub struct StdErrExecutionObserver;

impl ExecutionObserver for StdErrExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        eprintln!("[compgraph] {event}");
    }
}

/// Real-time metrics for an execution run.
///
/// The engine updates these counters while the output stream is pulled; callers can snapshot
/// them at any time. Runs started from the same engine share one set of counters, and each
/// run resets them when it starts.
pub struct ExecutionMetrics {
    run_id: AtomicU64,
    started_at: Mutex<Option<Instant>>,
    elapsed_ns: AtomicU64,

    rows_read: AtomicU64,
    rows_emitted: AtomicU64,
    groups_reduced: AtomicU64,
    spill_runs: AtomicU64,
    spilled_rows: AtomicU64,

    max_buffered_rows: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            started_at: Mutex::new(None),
            elapsed_ns: AtomicU64::new(0),
            rows_read: AtomicU64::new(0),
            rows_emitted: AtomicU64::new(0),
            groups_reduced: AtomicU64::new(0),
            spill_runs: AtomicU64::new(0),
            spilled_rows: AtomicU64::new(0),
            max_buffered_rows: AtomicUsize::new(0),
        }
    }

    pub fn begin_run(&self) {
        self.run_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut started) = self.started_at.lock() {
            *started = Some(Instant::now());
        }

        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.rows_read.store(0, Ordering::SeqCst);
        self.rows_emitted.store(0, Ordering::SeqCst);
        self.groups_reduced.store(0, Ordering::SeqCst);
        self.spill_runs.store(0, Ordering::SeqCst);
        self.spilled_rows.store(0, Ordering::SeqCst);
        self.max_buffered_rows.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    /// Time since the last [`ExecutionMetrics::begin_run`], if a run was started.
    pub fn running_for(&self) -> Option<Duration> {
        self.started_at
            .lock()
            .ok()
            .and_then(|started| started.map(|t| t.elapsed()))
    }

    pub fn on_row_read(&self) {
        self.rows_read.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_row_emitted(&self) {
        self.rows_emitted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_group_reduced(&self) {
        self.groups_reduced.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_spill(&self, rows: usize) {
        self.spill_runs.fetch_add(1, Ordering::SeqCst);
        self.spilled_rows.fetch_add(rows as u64, Ordering::SeqCst);
    }

    /// Record the current number of rows held by group and join buffers.
    pub fn on_buffered(&self, now: usize) {
        self.max_buffered_rows.fetch_max(now, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        ExecutionMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            rows_read: self.rows_read.load(Ordering::SeqCst),
            rows_emitted: self.rows_emitted.load(Ordering::SeqCst),
            groups_reduced: self.groups_reduced.load(Ordering::SeqCst),
            spill_runs: self.spill_runs.load(Ordering::SeqCst),
            spilled_rows: self.spilled_rows.load(Ordering::SeqCst),
            max_buffered_rows: self.max_buffered_rows.load(Ordering::SeqCst),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub rows_read: u64,
    pub rows_emitted: u64,
    pub groups_reduced: u64,
    pub spill_runs: u64,
    pub spilled_rows: u64,
    pub max_buffered_rows: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, rows_read={}, rows_emitted={}, groups_reduced={}, spill_runs={}, spilled_rows={}, max_buffered_rows={}, elapsed={:?}",
            self.run_id,
            self.rows_read,
            self.rows_emitted,
            self.groups_reduced,
            self.spill_runs,
            self.spilled_rows,
            self.max_buffered_rows,
            self.elapsed
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ExecutionEvent, ExecutionMetrics};
    use crate::error::GraphError;

    #[test]
    fn begin_run_resets_counters_and_bumps_run_id() {
        let m = ExecutionMetrics::new();
        m.begin_run();
        m.on_row_read();
        m.on_spill(10);
        m.on_buffered(7);
        m.on_buffered(3);
        let snap = m.snapshot();
        assert_eq!(snap.run_id, 1);
        assert_eq!(snap.rows_read, 1);
        assert_eq!((snap.spill_runs, snap.spilled_rows), (1, 10));
        assert_eq!(snap.max_buffered_rows, 7);

        m.begin_run();
        let snap = m.snapshot();
        assert_eq!(snap.run_id, 2);
        assert_eq!(snap.rows_read, 0);
        assert_eq!(snap.max_buffered_rows, 0);
        assert!(m.running_for().is_some());
    }

    #[test]
    fn snapshot_display_lists_counters() {
        let m = ExecutionMetrics::new();
        m.begin_run();
        m.on_row_emitted();
        m.end_run(Duration::from_millis(5));
        let text = m.snapshot().to_string();
        assert!(text.contains("rows_emitted=1"));
        assert!(text.contains("elapsed=Some(5ms)"));
    }

    #[test]
    fn events_render_as_log_lines() {
        let spilled = ExecutionEvent::SpillWritten { run: 2, rows: 64 };
        assert_eq!(spilled.to_string(), "spilled run 2 (64 rows)");

        let failed = ExecutionEvent::RunFailed {
            error: GraphError::UnboundSource { name: "docs".to_string() },
        };
        assert_eq!(failed.to_string(), "run failed: source 'docs' is not bound");
    }
}
