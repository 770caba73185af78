//! Pooled drive: a fixed set of worker threads claims runnable operators.
//!
//! The per-operator mutex is the work-claim flag: a worker that wins
//! `try_lock` owns that operator until it releases the claim, so at most
//! one worker executes a given operator at a time. Each worker scans the
//! topological order from its own offset, which spreads claims across the
//! graph without a scheduler queue. Idle workers park on the runtime's
//! condvar until a record is pushed or the run leaves Running.
//!
//! Emissions are routed while the claim is held, so per-edge FIFO order
//! is preserved under parallelism.

use std::sync::Arc;
use std::time::Duration;

use super::runtime::GraphRuntime;
use super::EngineError;

/// Records drained per input slot per claim; bounds claim hold time so
/// other runnable work is not starved.
const CLAIM_BATCH: usize = 64;

/// How long an idle worker parks before re-checking for termination.
const PARK_TIMEOUT: Duration = Duration::from_millis(1);

pub(super) fn run(runtime: &Arc<GraphRuntime>, thread_count: usize) -> Result<(), EngineError> {
    runtime.open_all()?;

    let workers = thread_count.max(1);
    std::thread::scope(|scope| {
        for index in 0..workers {
            let rt = Arc::clone(runtime);
            scope.spawn(move || worker_loop(&rt, index));
        }
    });

    if !runtime.stop_requested() {
        runtime.finish_all();
    }
    runtime.close_all();
    Ok(())
}

fn worker_loop(runtime: &GraphRuntime, start_offset: usize) {
    let node_count = runtime.plan.order.len();
    if node_count == 0 {
        return;
    }

    loop {
        if runtime.stop_requested() {
            break;
        }

        let mut did_work = false;
        for k in 0..node_count {
            if runtime.stop_requested() {
                break;
            }
            let node = runtime.plan.order[(k + start_offset) % node_count];
            if claim_and_run(runtime, node) {
                did_work = true;
            }
        }

        if !did_work {
            if runtime.terminated() || runtime.stop_requested() {
                runtime.notify_workers();
                break;
            }
            runtime.park(PARK_TIMEOUT);
        }
    }
}

/// Tries to claim `node` and run whatever work it has. Returns whether
/// any invocation happened.
fn claim_and_run(runtime: &GraphRuntime, node: usize) -> bool {
    let is_source = runtime.plan.is_source[node];

    // Cheap pre-check before contending for the claim.
    if is_source {
        if runtime.is_exhausted(node) {
            return false;
        }
    } else if !has_input(runtime, node) {
        return false;
    }

    let Some(mut op) = runtime.slots[node].op.try_lock() else {
        return false;
    };
    runtime.enter_claim();

    let mut did_work = false;
    if is_source {
        if !runtime.is_exhausted(node) {
            op.process(None, 0);
            let emitted = op.take_emitted();
            if !op.has_more() {
                runtime.mark_exhausted(node);
            }
            let produced = emitted.len() as u64;
            runtime.route(node, emitted);
            if produced > 0 {
                runtime.engine.count_ingested(produced);
            }
            did_work = true;
        }
    } else {
        for slot in 0..runtime.plan.input_counts[node] {
            let mut drained = 0;
            while drained < CLAIM_BATCH {
                if runtime.stop_requested() {
                    break;
                }
                let Some(msg) = runtime.pop(node, slot) else { break };
                op.process(Some(msg), slot);
                let emitted = op.take_emitted();
                runtime.route(node, emitted);
                drained += 1;
                did_work = true;
            }
        }
    }

    drop(op);
    runtime.leave_claim();
    did_work
}

fn has_input(runtime: &GraphRuntime, node: usize) -> bool {
    (0..runtime.plan.input_counts[node])
        .any(|slot| !runtime.queues[node][slot].lock().is_empty())
}
