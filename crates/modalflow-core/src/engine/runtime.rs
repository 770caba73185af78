//! Per-run execution state shared by all scheduling modes.
//!
//! A submitted graph is compiled into a [`RunPlan`] (dense indices,
//! topological order, pre-computed routes) plus a [`GraphRuntime`] holding
//! the operators, one FIFO buffer per input edge, the lifecycle state, and
//! the stop flag. Single-threaded and cooperative drives use it
//! uncontended; the pooled drive shares it across workers, with the
//! per-operator mutex doubling as the work-claim flag.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fxhash::FxHashMap;
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;

use crate::graph::{ExecutionGraph, OperatorId};
use crate::message::Message;
use crate::operator::{Emitted, Operator};

use super::{EngineError, EngineShared, GraphState};

/// One outgoing edge: target node (dense index) and the input slot the
/// record arrives on.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Route {
    pub target: usize,
    pub slot: usize,
}

/// Immutable per-run topology, compiled once at submission.
pub(crate) struct RunPlan {
    /// Dense index -> operator ID, in registration order.
    pub ids: Vec<OperatorId>,
    /// Dense indices in topological order.
    pub order: Vec<usize>,
    /// Dense index -> outgoing routes, in connect order.
    pub routes: Vec<SmallVec<[Route; 4]>>,
    /// Dense index -> number of input slots.
    pub input_counts: Vec<usize>,
    /// Dense index -> whether the node has no predecessors.
    pub is_source: Vec<bool>,
    /// Dense indices of source nodes, in topological order.
    pub sources: Vec<usize>,
}

impl RunPlan {
    /// Compiles the plan from a validated graph.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidGraph`] if the topological order is
    /// the cycle sentinel, or [`EngineError::Fatal`] if the adjacency maps
    /// are not transposes of each other (corrupted graph).
    pub fn build(graph: &ExecutionGraph) -> Result<Self, EngineError> {
        let topo = graph.topological_order();
        if topo.is_empty() && !graph.is_empty() {
            return Err(EngineError::InvalidGraph("cycle detected".to_string()));
        }

        let ids: Vec<OperatorId> = graph.operator_ids().to_vec();
        let dense: FxHashMap<OperatorId, usize> =
            ids.iter().enumerate().map(|(idx, &id)| (id, idx)).collect();

        let order: Vec<usize> = topo.iter().map(|id| dense[id]).collect();

        let mut input_counts = vec![0_usize; ids.len()];
        // Per node: predecessor ID -> input slots still unassigned, in
        // connect order. Forward and reverse adjacency are transposes, so
        // each forward occurrence consumes exactly one slot.
        let mut free_slots: Vec<FxHashMap<OperatorId, VecDeque<usize>>> =
            vec![FxHashMap::default(); ids.len()];
        for (idx, &id) in ids.iter().enumerate() {
            let preds = graph.predecessors(id);
            input_counts[idx] = preds.len();
            for (slot, &pred) in preds.iter().enumerate() {
                free_slots[idx].entry(pred).or_default().push_back(slot);
            }
        }

        let mut routes: Vec<SmallVec<[Route; 4]>> = vec![SmallVec::new(); ids.len()];
        for (idx, &id) in ids.iter().enumerate() {
            for &succ in graph.successors(id) {
                let target = dense[&succ];
                let slot = free_slots[target]
                    .get_mut(&id)
                    .and_then(VecDeque::pop_front)
                    .ok_or_else(|| {
                        EngineError::Fatal(format!(
                            "adjacency corrupted: edge {id} -> {succ} missing from reverse map"
                        ))
                    })?;
                routes[idx].push(Route { target, slot });
            }
        }

        let is_source: Vec<bool> = input_counts.iter().map(|&n| n == 0).collect();
        let sources: Vec<usize> = order.iter().copied().filter(|&i| is_source[i]).collect();

        Ok(Self { ids, order, routes, input_counts, is_source, sources })
    }
}

/// An operator slot; the mutex doubles as the pooled-mode work claim, so
/// at most one worker executes a given operator at a time.
pub(crate) struct OpSlot {
    pub op: Mutex<Box<dyn Operator>>,
}

/// Shared state of one submitted graph.
pub(crate) struct GraphRuntime {
    pub plan: RunPlan,
    pub slots: Vec<OpSlot>,
    /// One FIFO per input edge: `queues[node][slot]`.
    pub queues: Vec<Vec<Mutex<VecDeque<Message>>>>,
    state: AtomicU8,
    stop: AtomicBool,
    /// Messages buffered across all edges.
    in_flight: AtomicU64,
    /// Workers currently inside a claim (pooled mode termination guard).
    busy: AtomicUsize,
    /// Per dense node: source exhaustion flag (non-sources stay `true`).
    exhausted: Vec<AtomicBool>,
    work_mutex: Mutex<()>,
    work_cv: Condvar,
    pub engine: Arc<EngineShared>,
}

impl GraphRuntime {
    pub fn new(
        plan: RunPlan,
        mut operators: FxHashMap<OperatorId, Box<dyn Operator>>,
        engine: Arc<EngineShared>,
    ) -> Result<Self, EngineError> {
        let mut slots = Vec::with_capacity(plan.ids.len());
        for &id in &plan.ids {
            let op = operators
                .remove(&id)
                .ok_or_else(|| EngineError::Fatal(format!("operator {id} missing from graph")))?;
            slots.push(OpSlot { op: Mutex::new(op) });
        }

        let queues = plan
            .input_counts
            .iter()
            .map(|&n| (0..n).map(|_| Mutex::new(VecDeque::new())).collect())
            .collect();

        let exhausted = plan.is_source.iter().map(|&src| AtomicBool::new(!src)).collect();

        Ok(Self {
            plan,
            slots,
            queues,
            state: AtomicU8::new(GraphState::Submitted as u8),
            stop: AtomicBool::new(false),
            in_flight: AtomicU64::new(0),
            busy: AtomicUsize::new(0),
            exhausted,
            work_mutex: Mutex::new(()),
            work_cv: Condvar::new(),
            engine,
        })
    }

    // ---- Lifecycle state ----

    pub fn state(&self) -> GraphState {
        GraphState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: GraphState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Compare-and-swap transition; returns the previous state on failure.
    pub fn transition(&self, from: GraphState, to: GraphState) -> Result<(), GraphState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(GraphState::from_u8)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.work_cv.notify_all();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    // ---- Work accounting ----

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn enter_claim(&self) {
        self.busy.fetch_add(1, Ordering::AcqRel);
    }

    pub fn leave_claim(&self) {
        self.busy.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn mark_exhausted(&self, node: usize) {
        self.exhausted[node].store(true, Ordering::Release);
    }

    pub fn is_exhausted(&self, node: usize) -> bool {
        self.exhausted[node].load(Ordering::Acquire)
    }

    pub fn all_sources_exhausted(&self) -> bool {
        self.plan.sources.iter().all(|&i| self.is_exhausted(i))
    }

    /// Termination criterion: every source exhausted, every edge empty,
    /// and (pooled mode) nobody mid-claim.
    pub fn terminated(&self) -> bool {
        self.all_sources_exhausted()
            && self.in_flight() == 0
            && self.busy.load(Ordering::Acquire) == 0
    }

    /// Parks a pooled worker until new work may exist.
    pub fn park(&self, timeout: Duration) {
        let mut guard = self.work_mutex.lock();
        self.work_cv.wait_for(&mut guard, timeout);
    }

    pub fn notify_workers(&self) {
        self.work_cv.notify_all();
    }

    // ---- Message movement ----

    /// Broadcasts drained emissions along every outgoing edge of `from`.
    /// The last edge receives the moved message, earlier edges receive
    /// replicas under the same uid. Must be called before the claim on
    /// `from` is released so per-edge FIFO order holds.
    pub fn route(&self, from: usize, emitted: Emitted) {
        let targets = &self.plan.routes[from];
        if targets.is_empty() {
            // Terminal node: emissions have nowhere to go.
            return;
        }
        let mut pushed = 0_u64;
        for msg in emitted {
            for route in &targets[..targets.len() - 1] {
                self.queues[route.target][route.slot].lock().push_back(msg.replicate());
                pushed += 1;
            }
            let last = targets[targets.len() - 1];
            self.queues[last.target][last.slot].lock().push_back(msg);
            pushed += 1;
        }
        if pushed > 0 {
            self.in_flight.fetch_add(pushed, Ordering::AcqRel);
            self.work_cv.notify_all();
        }
    }

    /// Pops one buffered record from an input edge.
    pub fn pop(&self, node: usize, slot: usize) -> Option<Message> {
        let msg = self.queues[node][slot].lock().pop_front();
        if msg.is_some() {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
        }
        msg
    }

    // ---- Lifecycle sweeps ----

    /// Opens every operator in topological order. If an `init` fails, the
    /// already-opened prefix is closed in reverse order and the failure is
    /// surfaced as a resource error.
    pub fn open_all(&self) -> Result<(), EngineError> {
        let mut opened: Vec<usize> = Vec::with_capacity(self.plan.order.len());
        for &i in &self.plan.order {
            let mut op = self.slots[i].op.lock();
            if let Err(source) = op.open() {
                let operator = op.name().to_string();
                drop(op);
                for &j in opened.iter().rev() {
                    let mut prev = self.slots[j].op.lock();
                    if let Err(err) = prev.close() {
                        tracing::error!(
                            operator = %prev.name(),
                            error = %err,
                            "close failed during start-up unwind"
                        );
                    }
                }
                return Err(EngineError::Resource { operator, phase: "open", source });
            }
            opened.push(i);
        }
        Ok(())
    }

    /// Closes every operator in reverse topological order. Failures are
    /// logged; the sweep always completes so resources are released on
    /// every exit path.
    pub fn close_all(&self) {
        for &i in self.plan.order.iter().rev() {
            let mut op = self.slots[i].op.lock();
            if let Err(err) = op.close() {
                tracing::error!(operator = %op.name(), error = %err, "operator close failed");
            }
        }
    }

    /// End-of-stream sweep in topological order: drains each node's queued
    /// inputs, then lets it flush buffered state. Flush emissions flow to
    /// nodes later in the order, so one pass empties the graph.
    pub fn finish_all(&self) {
        for &i in &self.plan.order {
            if self.stop_requested() {
                return;
            }
            self.drain_node(i);
            let mut op = self.slots[i].op.lock();
            if op.finish() {
                let emitted = op.take_emitted();
                self.route(i, emitted);
            }
        }
    }

    /// Synchronously processes everything buffered on one node's input
    /// edges, FIFO per edge. Used by the single-threaded drive and the
    /// end-of-stream sweep.
    pub fn drain_node(&self, node: usize) {
        let mut op = self.slots[node].op.lock();
        for slot in 0..self.plan.input_counts[node] {
            while let Some(msg) = self.pop(node, slot) {
                op.process(Some(msg), slot);
                let emitted = op.take_emitted();
                self.route(node, emitted);
                if self.stop_requested() {
                    return;
                }
            }
        }
    }

    /// Runs one source invocation under the claim, routing its emissions
    /// and updating the exhaustion flag and the engine ingress counter.
    /// Returns whether anything was emitted.
    pub fn pump_source(&self, node: usize) -> bool {
        let mut op = self.slots[node].op.lock();
        op.process(None, 0);
        let emitted = op.take_emitted();
        if !op.has_more() {
            self.mark_exhausted(node);
        }
        let produced = emitted.len() as u64;
        let had_output = produced > 0;
        self.route(node, emitted);
        drop(op);
        if produced > 0 {
            self.engine.count_ingested(produced);
        }
        had_output
    }
}
