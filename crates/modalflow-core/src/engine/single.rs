//! Single-threaded drive: strict topological sweeps on the caller's
//! thread.

use std::sync::Arc;

use super::runtime::GraphRuntime;
use super::EngineError;

/// Repeats topological sweeps until every source is exhausted and every
/// edge is drained, then runs the end-of-stream flush.
pub(super) fn run(runtime: &Arc<GraphRuntime>) -> Result<(), EngineError> {
    runtime.open_all()?;

    loop {
        if runtime.stop_requested() {
            break;
        }

        for &node in &runtime.plan.order {
            if runtime.stop_requested() {
                break;
            }
            if runtime.plan.is_source[node] {
                if !runtime.is_exhausted(node) {
                    runtime.pump_source(node);
                }
            } else {
                runtime.drain_node(node);
            }
        }

        if runtime.all_sources_exhausted() && runtime.in_flight() == 0 {
            break;
        }
    }

    if !runtime.stop_requested() {
        runtime.finish_all();
    }
    runtime.close_all();
    Ok(())
}
