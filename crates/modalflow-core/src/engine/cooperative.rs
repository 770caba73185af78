//! Cooperative drive: a single-threaded scheduler where every operator is
//! a task and suspension points sit exactly between `process`
//! invocations.
//!
//! Each scheduling step runs one invocation of one runnable task (a
//! source with `has_next() == true`, or a non-source with a non-empty
//! input edge), then control rotates round-robin to the next task.
//! Functions never observe a suspension inside `execute`.

use std::sync::Arc;

use super::runtime::GraphRuntime;
use super::EngineError;

pub(super) fn run(runtime: &Arc<GraphRuntime>) -> Result<(), EngineError> {
    runtime.open_all()?;

    let tasks = &runtime.plan.order;
    let task_count = tasks.len();
    let mut cursor = 0_usize;

    while task_count > 0 && !runtime.stop_requested() {
        let mut ran = false;

        for offset in 0..task_count {
            let position = (cursor + offset) % task_count;
            let node = tasks[position];

            if step(runtime, node) {
                cursor = (position + 1) % task_count;
                ran = true;
                break;
            }
        }

        if !ran {
            // No runnable task. With one thread nothing can become
            // runnable behind our back, so the stream has ended.
            debug_assert!(runtime.all_sources_exhausted() && runtime.in_flight() == 0);
            break;
        }
    }

    if !runtime.stop_requested() {
        runtime.finish_all();
    }
    runtime.close_all();
    Ok(())
}

/// Runs at most one `process` invocation on `node`. Returns whether the
/// task was runnable.
fn step(runtime: &Arc<GraphRuntime>, node: usize) -> bool {
    if runtime.plan.is_source[node] {
        if runtime.is_exhausted(node) {
            return false;
        }
        runtime.pump_source(node);
        return true;
    }

    for slot in 0..runtime.plan.input_counts[node] {
        if let Some(msg) = runtime.pop(node, slot) {
            let mut op = runtime.slots[node].op.lock();
            op.process(Some(msg), slot);
            let emitted = op.take_emitted();
            runtime.route(node, emitted);
            return true;
        }
    }
    false
}
