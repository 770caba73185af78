//! # Stream Engine
//!
//! Owns submitted graphs and drives them to completion.
//!
//! ## Lifecycle
//!
//! ```text
//! Unknown ──submit──▶ Submitted ──execute──▶ Running ──exhaustion──▶ Completed
//!                        │                     │  │
//!                        └──────stop───────────┘  └──────stop──────▶ Stopped
//!                                   (failures transition to Error)
//! ```
//!
//! ## Scheduling modes
//!
//! Selected at engine construction and fixed for the engine's lifetime:
//!
//! - **`SingleThreaded`**: the drive runs on the caller's thread as strict
//!   topological sweeps.
//! - **`Pooled`**: a fixed worker set claims runnable operators; at most
//!   one worker executes a given operator at a time, and idle workers park
//!   on a condvar.
//! - **`Async`**: a cooperative scheduler on one thread; exactly one
//!   `process` invocation per scheduling step, round-robin over runnable
//!   tasks.
//!
//! Termination in every mode: all sources report `has_next() == false`
//! and every edge buffer is empty. `stop` is cooperative and observed at
//! operator boundaries; buffered records are discarded only after `close`
//! ran on every operator.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use fxhash::FxHashMap;
use parking_lot::Mutex;

use crate::function::FunctionError;
use crate::graph::{ExecutionGraph, OperatorId};
use crate::operator::OperatorKind;

mod cooperative;
mod pooled;
mod runtime;
mod single;


use runtime::{GraphRuntime, RunPlan};

/// Engine-assigned graph identifier, monotone per engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(pub u64);

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph#{}", self.0)
    }
}

/// Scheduling model, fixed for the engine's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Drive on the caller's thread, strictly sequential.
    #[default]
    SingleThreaded,
    /// Fixed-size worker pool with per-operator claims.
    Pooled,
    /// Cooperative single-threaded scheduler.
    Async,
}

/// Lifecycle state of a submitted graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GraphState {
    /// Not registered with this engine.
    Unknown = 0,
    /// Validated and registered, not yet started.
    Submitted = 1,
    /// A drive loop is active.
    Running = 2,
    /// Sources exhausted and every edge drained.
    Completed = 3,
    /// Explicitly stopped.
    Stopped = 4,
    /// A structural or lifecycle failure aborted the graph.
    Error = 5,
}

impl GraphState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Submitted,
            2 => Self::Running,
            3 => Self::Completed,
            4 => Self::Stopped,
            5 => Self::Error,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Submission or execution was attempted on a graph that cannot run
    /// (cycle, dangling edge, unknown ID, wrong lifecycle state).
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// A builder chain or operator was used before it was configured.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// An operator's `init` (or start-up `close` unwind) failed.
    #[error("operator '{operator}' failed during {phase}: {source}")]
    Resource {
        /// The operator whose lifecycle hook failed.
        operator: String,
        /// Which hook failed.
        phase: &'static str,
        /// The underlying function failure.
        source: FunctionError,
    },

    /// Unrecoverable engine-internal condition.
    #[error("fatal engine failure: {0}")]
    Fatal(String),
}

/// Engine configuration: scheduling mode plus pool sizing.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Scheduling model.
    pub mode: ExecutionMode,
    /// Worker count for [`ExecutionMode::Pooled`].
    pub thread_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { mode: ExecutionMode::SingleThreaded, thread_count: num_cpus::get() }
    }
}

impl EngineConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotConfigured`] if the pool size is zero.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.thread_count == 0 {
            return Err(EngineError::NotConfigured("thread_count must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    mode: Option<ExecutionMode>,
    thread_count: Option<usize>,
}

impl EngineConfigBuilder {
    /// Sets the scheduling mode.
    #[must_use]
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Sets the worker count for pooled execution.
    #[must_use]
    pub fn thread_count(mut self, n: usize) -> Self {
        self.thread_count = Some(n);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotConfigured`] for invalid settings.
    pub fn build(self) -> Result<EngineConfig, EngineError> {
        let defaults = EngineConfig::default();
        let config = EngineConfig {
            mode: self.mode.unwrap_or(defaults.mode),
            thread_count: self.thread_count.unwrap_or(defaults.thread_count),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Engine-wide counters shared with every run.
#[derive(Debug)]
pub(crate) struct EngineShared {
    ingested: AtomicU64,
    started: Mutex<Instant>,
}

impl EngineShared {
    fn new() -> Self {
        Self { ingested: AtomicU64::new(0), started: Mutex::new(Instant::now()) }
    }

    pub fn count_ingested(&self, n: u64) {
        self.ingested.fetch_add(n, Ordering::Relaxed);
    }
}

/// Read-only snapshot of engine metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineMetrics {
    /// Messages produced by sources across all graphs since the last
    /// reset.
    pub processed: u64,
    /// `processed` divided by wall-clock seconds since the last reset.
    pub throughput: f64,
}

/// Read-only snapshot of one operator's identity and counters.
#[derive(Debug, Clone)]
pub struct OperatorStats {
    /// Operator name.
    pub name: String,
    /// Operator kind.
    pub kind: OperatorKind,
    /// Messages processed.
    pub processed: u64,
    /// Messages emitted downstream.
    pub emitted: u64,
    /// Trapped failures.
    pub errors: u64,
}

struct GraphEntry {
    runtime: Arc<GraphRuntime>,
    worker: Option<JoinHandle<()>>,
}

/// Owns submitted graphs and their lifecycle, and drives them under the
/// configured scheduling mode.
///
/// All methods take `&self`: an engine is shared behind an [`Arc`] by the
/// `DataStream` builder, and `stop` may be called from another thread
/// while a drive runs.
pub struct StreamEngine {
    config: EngineConfig,
    graphs: Mutex<FxHashMap<GraphId, GraphEntry>>,
    next_graph_id: AtomicU64,
    shared: Arc<EngineShared>,
}

impl fmt::Debug for StreamEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEngine")
            .field("mode", &self.config.mode)
            .field("graphs", &self.graphs.lock().len())
            .finish_non_exhaustive()
    }
}

impl StreamEngine {
    /// Creates an engine with the given scheduling mode and default pool
    /// sizing.
    #[must_use]
    pub fn new(mode: ExecutionMode) -> Self {
        Self::with_config(EngineConfig { mode, ..EngineConfig::default() })
    }

    /// Creates an engine from a full configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            graphs: Mutex::new(FxHashMap::default()),
            next_graph_id: AtomicU64::new(0),
            shared: Arc::new(EngineShared::new()),
        }
    }

    /// The configured scheduling mode.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.config.mode
    }

    /// Validates and registers a graph, taking ownership of its
    /// operators. The graph starts in [`GraphState::Submitted`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidGraph`] if validation fails.
    pub fn submit(&self, mut graph: ExecutionGraph) -> Result<GraphId, EngineError> {
        if !graph.validate() {
            return Err(EngineError::InvalidGraph("cycle detected".to_string()));
        }
        let plan = RunPlan::build(&graph)?;
        let operators = graph.take_operators();
        let runtime = Arc::new(GraphRuntime::new(plan, operators, Arc::clone(&self.shared))?);

        let id = GraphId(self.next_graph_id.fetch_add(1, Ordering::Relaxed));
        self.graphs.lock().insert(id, GraphEntry { runtime, worker: None });
        tracing::debug!(graph = %id, "graph submitted");
        Ok(id)
    }

    /// Drives a graph to completion on the caller's thread.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidGraph`] for unknown IDs or wrong
    /// lifecycle states, [`EngineError::Resource`] if start-up fails, or
    /// [`EngineError::Fatal`] for engine-internal failures. Any failure
    /// transitions the graph to [`GraphState::Error`].
    pub fn execute(&self, graph_id: GraphId) -> Result<(), EngineError> {
        let runtime = self.runtime(graph_id)?;
        Self::drive(&runtime, self.config.mode, self.config.thread_count)
    }

    /// Starts a drive on an internal worker thread and returns
    /// immediately. Use [`StreamEngine::wait`] to join it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidGraph`] for unknown IDs or if the
    /// graph is not in [`GraphState::Submitted`].
    pub fn execute_async(&self, graph_id: GraphId) -> Result<(), EngineError> {
        let runtime = self.runtime(graph_id)?;
        if runtime.state() != GraphState::Submitted {
            return Err(EngineError::InvalidGraph(format!(
                "{graph_id} is {}, expected submitted",
                runtime.state()
            )));
        }

        let mode = self.config.mode;
        let threads = self.config.thread_count;
        let handle = std::thread::Builder::new()
            .name(format!("modalflow-{graph_id}"))
            .spawn(move || {
                if let Err(err) = Self::drive(&runtime, mode, threads) {
                    tracing::error!(graph = %graph_id, error = %err, "async drive failed");
                }
            })
            .map_err(|err| EngineError::Fatal(format!("worker spawn failed: {err}")))?;

        if let Some(entry) = self.graphs.lock().get_mut(&graph_id) {
            entry.worker = Some(handle);
        }
        Ok(())
    }

    /// Joins an async drive, if one is active.
    pub fn wait(&self, graph_id: GraphId) {
        let handle = self.graphs.lock().get_mut(&graph_id).and_then(|e| e.worker.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!(graph = %graph_id, "async drive panicked");
                if let Some(entry) = self.graphs.lock().get(&graph_id) {
                    entry.runtime.set_state(GraphState::Error);
                }
            }
        }
    }

    /// Cooperatively stops a graph and returns its resulting state.
    ///
    /// The drive loop observes the request at the next operator boundary;
    /// no in-flight `process` is aborted. `close` still runs on every
    /// operator, after which buffered records are discarded. Stopping a
    /// graph that is already Completed or Stopped is a no-op, and
    /// stopping an unknown ID answers [`GraphState::Unknown`].
    pub fn stop(&self, graph_id: GraphId) -> GraphState {
        let Ok(runtime) = self.runtime(graph_id) else {
            return GraphState::Unknown;
        };
        loop {
            match runtime.state() {
                GraphState::Submitted => {
                    // Never started: nothing to unwind. A failed swap
                    // means a drive won the race; retry against the new
                    // state.
                    if runtime.transition(GraphState::Submitted, GraphState::Stopped).is_ok() {
                        break;
                    }
                }
                GraphState::Running => {
                    runtime.request_stop();
                    self.wait(graph_id);
                    break;
                }
                _ => break,
            }
        }
        runtime.state()
    }

    /// Current lifecycle state; [`GraphState::Unknown`] for unregistered
    /// IDs.
    #[must_use]
    pub fn state(&self, graph_id: GraphId) -> GraphState {
        self.graphs.lock().get(&graph_id).map_or(GraphState::Unknown, |e| e.runtime.state())
    }

    /// Whether the graph is currently running.
    #[must_use]
    pub fn is_graph_running(&self, graph_id: GraphId) -> bool {
        self.state(graph_id) == GraphState::Running
    }

    /// IDs of all submitted graphs, ascending.
    #[must_use]
    pub fn submitted_graphs(&self) -> Vec<GraphId> {
        let mut ids: Vec<GraphId> = self.graphs.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Stops (if needed) and erases a graph.
    pub fn remove_graph(&self, graph_id: GraphId) {
        self.stop(graph_id);
        self.graphs.lock().remove(&graph_id);
    }

    /// Snapshot of one operator's counters. The engine owns submitted
    /// graphs, so this lookup is how hosts observe per-operator progress.
    #[must_use]
    pub fn operator_stats(&self, graph_id: GraphId, operator: OperatorId) -> Option<OperatorStats> {
        let runtime = self.runtime(graph_id).ok()?;
        let dense = runtime.plan.ids.iter().position(|&id| id == operator)?;
        let op = runtime.slots[dense].op.lock();
        Some(OperatorStats {
            name: op.name().to_string(),
            kind: op.kind(),
            processed: op.processed_count(),
            emitted: op.output_count(),
            errors: op.error_count(),
        })
    }

    /// Total messages produced by sources since the last metrics reset.
    #[must_use]
    pub fn total_processed(&self) -> u64 {
        self.shared.ingested.load(Ordering::Relaxed)
    }

    /// Messages per second of wall-clock time since the last metrics
    /// reset.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn throughput(&self) -> f64 {
        let elapsed = self.shared.started.lock().elapsed().as_secs_f64();
        if elapsed <= f64::EPSILON {
            return 0.0;
        }
        self.total_processed() as f64 / elapsed
    }

    /// Snapshot of the engine-wide counters.
    #[must_use]
    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics { processed: self.total_processed(), throughput: self.throughput() }
    }

    /// Zeroes the processed counter and restarts the throughput clock.
    pub fn reset_metrics(&self) {
        self.shared.ingested.store(0, Ordering::Relaxed);
        *self.shared.started.lock() = Instant::now();
    }

    // ---- Internals ----

    fn runtime(&self, graph_id: GraphId) -> Result<Arc<GraphRuntime>, EngineError> {
        self.graphs
            .lock()
            .get(&graph_id)
            .map(|e| Arc::clone(&e.runtime))
            .ok_or_else(|| EngineError::InvalidGraph(format!("{graph_id} is not registered")))
    }

    /// Shared drive entry: transitions Submitted→Running, runs the
    /// mode-specific loop, then settles the terminal state.
    fn drive(
        runtime: &Arc<GraphRuntime>,
        mode: ExecutionMode,
        thread_count: usize,
    ) -> Result<(), EngineError> {
        if let Err(prev) = runtime.transition(GraphState::Submitted, GraphState::Running) {
            return Err(EngineError::InvalidGraph(format!(
                "graph is {prev}, expected submitted"
            )));
        }

        let result = match mode {
            ExecutionMode::SingleThreaded => single::run(runtime),
            ExecutionMode::Pooled => pooled::run(runtime, thread_count),
            ExecutionMode::Async => cooperative::run(runtime),
        };

        match result {
            Ok(()) => {
                let terminal = if runtime.stop_requested() {
                    GraphState::Stopped
                } else {
                    GraphState::Completed
                };
                runtime.set_state(terminal);
                tracing::debug!(state = %terminal, "drive finished");
                Ok(())
            }
            Err(err) => {
                runtime.set_state(GraphState::Error);
                tracing::error!(error = %err, "drive aborted");
                Err(err)
            }
        }
    }
}
