//! Execution engine for computation graphs.
//!
//! This module sits "above" [`crate::processing`] and provides:
//!
//! - Lowering of a [`crate::Graph`] into an arena plan and lazy wiring of operator streams
//! - Per-run memoization: a node read by several consumers is evaluated once and broadcast
//! - Optional order-preserving parallelism for map/filter on a rayon pool
//! - Resource limits (buffered-row ceiling, sort chunk size, spill directory)
//! - Real-time metrics + observer hooks for monitoring

mod bindings;
mod observer;
mod plan;
mod tee;

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;

use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, Operator};
use crate::processing::filter::FilterStream;
use crate::processing::fold::FoldStream;
use crate::processing::join::JoinStream;
use crate::processing::map::{FlatMapStream, MapStream};
use crate::processing::parallel::{ParallelStream, Stage};
use crate::processing::reduce::ReduceStream;
use crate::processing::sort::SortStream;
use crate::processing::RowStream;
use crate::types::Row;

pub use bindings::Bindings;
pub use observer::{
    ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver, StdErrExecutionObserver,
};

use plan::Plan;
use tee::Tee;

/// Configuration for the [`ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Rows per in-memory sort chunk; larger inputs are spilled to disk in runs of this size.
    pub sort_chunk_rows: usize,
    /// Most spilled runs merged at once. More runs are first merged in passes into longer
    /// intermediate runs, so a sort keeps at most this many spill files open.
    pub merge_fan_in: usize,
    /// Ceiling on rows held at once by group and join buffers, across the whole run.
    ///
    /// If `None`, buffering is unbounded. Exceeding the ceiling fails the run with
    /// [`GraphError::MemoryLimitExceeded`].
    pub max_buffered_rows: Option<usize>,
    /// Directory for sort spill files. If `None`, uses the system temp directory.
    pub spill_dir: Option<PathBuf>,
    /// Worker threads for map/filter batches.
    ///
    /// If `None`, map and filter run inline on the pulling thread.
    pub num_threads: Option<usize>,
    /// Rows per parallel map/filter batch.
    pub batch_rows: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            sort_chunk_rows: 65_536,
            merge_fan_in: 64,
            max_buffered_rows: None,
            spill_dir: None,
            num_threads: None,
            batch_rows: 4_096,
        }
    }
}

impl ExecutionOptions {
    fn validate(&self) -> GraphResult<()> {
        if self.sort_chunk_rows == 0 {
            return Err(GraphError::InvalidOptions("sort_chunk_rows must be > 0".to_string()));
        }
        if self.merge_fan_in < 2 {
            return Err(GraphError::InvalidOptions("merge_fan_in must be >= 2".to_string()));
        }
        if self.batch_rows == 0 {
            return Err(GraphError::InvalidOptions("batch_rows must be > 0".to_string()));
        }
        if self.num_threads == Some(0) {
            return Err(GraphError::InvalidOptions(
                "num_threads must be > 0 when set".to_string(),
            ));
        }
        if self.max_buffered_rows == Some(0) {
            return Err(GraphError::InvalidOptions(
                "max_buffered_rows must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runs [`Graph`]s against bound sources.
///
/// An engine can be shared across threads; each [`ExecutionEngine::run`] is independent.
pub struct ExecutionEngine {
    pool: Option<Arc<ThreadPool>>,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl ExecutionEngine {
    /// Create a new engine with the given options.
    ///
    /// # Panics
    ///
    /// Panics if the options are invalid (`sort_chunk_rows == 0`, `merge_fan_in < 2`,
    /// `batch_rows == 0`, `num_threads == Some(0)`, `max_buffered_rows == Some(0)`) or the
    /// thread pool cannot be built. Use [`ExecutionEngine::try_new`] to get an error instead.
    pub fn new(opts: ExecutionOptions) -> Self {
        Self::try_new(opts).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Create a new engine, reporting invalid options as [`GraphError::InvalidOptions`].
    pub fn try_new(opts: ExecutionOptions) -> GraphResult<Self> {
        opts.validate()?;

        let pool = match opts.num_threads {
            Some(n) => Some(Arc::new(
                ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| GraphError::ThreadPool(e.to_string()))?,
            )),
            None => None,
        };

        Ok(Self {
            pool,
            opts,
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        })
    }

    /// Attach an observer for execution events (metrics/logging).
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get a handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.opts
    }

    /// Start a run of `graph` and return its output stream.
    ///
    /// Bindings must cover exactly the graph's sources: a missing one fails with
    /// [`GraphError::UnboundSource`], an extra one with [`GraphError::UnexpectedSource`].
    /// Both are checked before any row is pulled. Everything else is lazy: rows are read,
    /// transformed, sorted and joined only as the returned stream is consumed.
    pub fn run<'a>(&self, graph: &Graph, mut bindings: Bindings<'a>) -> GraphResult<RunOutput<'a>> {
        let plan = Plan::lower(graph);
        let sources = plan.source_names();

        let ctx = Rc::new(RunContext {
            options: self.opts.clone(),
            metrics: Arc::clone(&self.metrics),
            observer: self.observer.clone(),
            pool: self.pool.clone(),
            buffered: Cell::new(0),
        });

        if let Err(error) = check_bindings(&sources, &bindings) {
            ctx.emit(ExecutionEvent::RunFailed {
                error: error.clone(),
            });
            return Err(error);
        }

        self.metrics.begin_run();
        ctx.emit(ExecutionEvent::RunStarted {
            nodes: plan.nodes.len(),
            sources,
        });

        let output = wire(&plan, &mut bindings, &ctx)?;
        Ok(RunOutput {
            inner: output,
            ctx,
            started: Instant::now(),
            finished: false,
        })
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self {
            pool: None,
            opts: ExecutionOptions::default(),
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        }
    }
}

fn check_bindings(sources: &[String], bindings: &Bindings<'_>) -> GraphResult<()> {
    if let Some(name) = sources.iter().find(|name| !bindings.contains(name)) {
        return Err(GraphError::UnboundSource { name: name.clone() });
    }
    if let Some(name) = bindings
        .names()
        .find(|name| !sources.iter().any(|s| s.as_str() == *name))
    {
        return Err(GraphError::UnexpectedSource {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Where a wired node's output goes: straight to its single consumer, or through a tee.
enum Slot<'a> {
    Single(Option<RowStream<'a>>),
    Shared(Tee<'a>),
}

impl<'a> Slot<'a> {
    fn take(&mut self) -> RowStream<'a> {
        match self {
            Slot::Single(stream) => stream.take().unwrap_or_else(|| Box::new(std::iter::empty())),
            Slot::Shared(tee) => Box::new(tee.handle()),
        }
    }
}

fn wire<'a>(plan: &Plan, bindings: &mut Bindings<'a>, ctx: &Rc<RunContext>) -> GraphResult<RowStream<'a>> {
    let mut slots: Vec<Slot<'a>> = Vec::with_capacity(plan.nodes.len());

    for node in &plan.nodes {
        let mut inputs: Vec<RowStream<'a>> = node.inputs.iter().map(|&i| slots[i].take()).collect();
        let mut input = || inputs.remove(0);

        let stream: RowStream<'a> = match &node.op {
            Operator::Source { name } => {
                let rows = bindings
                    .take(name)
                    .ok_or_else(|| GraphError::UnboundSource { name: name.clone() })?;
                let metrics = Arc::clone(&ctx.metrics);
                Box::new(rows.inspect(move |row| {
                    if row.is_ok() {
                        metrics.on_row_read();
                    }
                }))
            }
            Operator::Map(mapper) => match &ctx.pool {
                Some(pool) => Box::new(ParallelStream::new(
                    input(),
                    Stage::Map(Arc::clone(mapper)),
                    Arc::clone(pool),
                    ctx.options.batch_rows,
                )),
                None => Box::new(MapStream::new(input(), Arc::clone(mapper))),
            },
            Operator::FlatMap(mapper) => Box::new(FlatMapStream::new(input(), Arc::clone(mapper))),
            Operator::Filter(predicate) => match &ctx.pool {
                Some(pool) => Box::new(ParallelStream::new(
                    input(),
                    Stage::Filter(Arc::clone(predicate)),
                    Arc::clone(pool),
                    ctx.options.batch_rows,
                )),
                None => Box::new(FilterStream::new(input(), Arc::clone(predicate))),
            },
            Operator::Fold { initial, folder } => {
                Box::new(FoldStream::new(input(), initial.clone(), Arc::clone(folder)))
            }
            Operator::Reduce { keys, reducer } => Box::new(ReduceStream::new(
                input(),
                Arc::clone(keys),
                Arc::clone(reducer),
                Rc::clone(ctx),
            )),
            Operator::Sort { keys } => {
                Box::new(SortStream::new(input(), Arc::clone(keys), Rc::clone(ctx)))
            }
            Operator::Join { kind, keys, options } => {
                let left = input();
                let right = input();
                Box::new(JoinStream::new(
                    left,
                    right,
                    Arc::clone(keys),
                    *kind,
                    Arc::clone(options),
                    Rc::clone(ctx),
                ))
            }
        };

        slots.push(if node.consumers > 1 {
            Slot::Shared(Tee::new(stream, node.consumers))
        } else {
            Slot::Single(Some(stream))
        });
    }

    Ok(slots[plan.root()].take())
}

/// State shared by every operator stream of one run.
pub(crate) struct RunContext {
    pub(crate) options: ExecutionOptions,
    pub(crate) metrics: Arc<ExecutionMetrics>,
    observer: Option<Arc<dyn ExecutionObserver>>,
    pool: Option<Arc<ThreadPool>>,
    buffered: Cell<usize>,
}

impl RunContext {
    pub(crate) fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }

    /// Account for one more buffered row, failing if the run's ceiling would be exceeded.
    pub(crate) fn reserve_buffered(&self, operator: &str) -> GraphResult<()> {
        let now = self.buffered.get() + 1;
        if let Some(limit) = self.options.max_buffered_rows {
            if now > limit {
                return Err(GraphError::MemoryLimitExceeded {
                    operator: operator.to_string(),
                    limit,
                });
            }
        }
        self.buffered.set(now);
        self.metrics.on_buffered(now);
        Ok(())
    }

    pub(crate) fn release_buffered(&self, rows: usize) {
        self.buffered.set(self.buffered.get().saturating_sub(rows));
    }

    #[cfg(test)]
    pub(crate) fn for_tests(options: ExecutionOptions) -> Rc<Self> {
        Rc::new(Self {
            options,
            metrics: Arc::new(ExecutionMetrics::new()),
            observer: None,
            pool: None,
            buffered: Cell::new(0),
        })
    }
}

/// The lazy output of one run.
///
/// Dropping it (consumed or not) releases every buffer and spill file of the run. Once the
/// stream ends, the observer receives [`ExecutionEvent::RunFinished`] (or
/// [`ExecutionEvent::RunFailed`] on the first error).
pub struct RunOutput<'a> {
    inner: RowStream<'a>,
    ctx: Rc<RunContext>,
    started: Instant,
    finished: bool,
}

impl RunOutput<'_> {
    /// Snapshot of the run's metrics so far.
    pub fn metrics(&self) -> ExecutionMetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// Drain the stream into a vector, stopping at the first error.
    pub fn collect_rows(self) -> GraphResult<Vec<Row>> {
        self.collect()
    }
}

impl Iterator for RunOutput<'_> {
    type Item = GraphResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.inner.next() {
            Some(Ok(row)) => {
                self.ctx.metrics.on_row_emitted();
                Some(Ok(row))
            }
            Some(Err(error)) => {
                self.finished = true;
                self.ctx.emit(ExecutionEvent::RunFailed {
                    error: error.clone(),
                });
                Some(Err(error))
            }
            None => {
                self.finished = true;
                let elapsed = self.started.elapsed();
                self.ctx.metrics.end_run(elapsed);
                self.ctx.emit(ExecutionEvent::RunFinished {
                    elapsed,
                    metrics: self.ctx.metrics.snapshot(),
                });
                None
            }
        }
    }
}
