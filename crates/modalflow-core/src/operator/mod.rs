//! # Operators
//!
//! Flow-control nodes of the execution graph.
//!
//! An operator owns ingress, emission, counters, and lifecycle; the message
//! logic lives in the contained function. The operator set is closed, so
//! each variant is a concrete struct behind the [`Operator`] trait; the
//! functions they host are open-set trait objects.
//!
//! ## Contract
//!
//! - `process` is invoked with zero (source) or one (non-source) input
//!   message plus the input slot it arrived on. It returns `true` iff at
//!   least one downstream message was emitted. It never propagates function
//!   failures: those are trapped, counted, and logged.
//! - `open`/`close` are idempotent and delegate to the function's
//!   `init`/`close`.
//! - Emissions accumulate in an internal outbox; the scheduler drains it
//!   with [`Operator::take_emitted`] and broadcasts each message along
//!   every outgoing edge.
//! - Operators with buffered state flush through [`Operator::finish`] once
//!   all sources are exhausted, before any `close` runs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::function::{FunctionError, FunctionKind};
use crate::message::Message;

mod aggregate;
mod filter;
mod flat_map;
mod join;
mod key_by;
mod map;
mod sink;
mod source;
mod topk;
mod window;

pub use aggregate::{AggregateOperator, AggregateOps, StatsAggregate};
pub use filter::FilterOperator;
pub use flat_map::FlatMapOperator;
pub use join::JoinOperator;
pub use key_by::{KeyByOperator, KeyStrategy};
pub use map::MapOperator;
pub use sink::SinkOperator;
pub use source::SourceOperator;
pub use topk::TopKOperator;
pub use window::{WindowOperator, WindowSpec};

/// Batch of messages drained from an operator outbox.
///
/// Most invocations emit 0 or 1 messages; the inline capacity covers the
/// common case without heap allocation.
pub type Emitted = SmallVec<[Message; 4]>;

/// Operator variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    /// Produces messages from outside the graph.
    Source,
    /// One-to-one transformation.
    Map,
    /// Conditional pass-through.
    Filter,
    /// One-to-many transformation.
    FlatMap,
    /// Partition-key stamping.
    KeyBy,
    /// Tumbling window batching.
    Window,
    /// Window-batch summarisation.
    Aggregate,
    /// Two-input pairing.
    Join,
    /// Best-k retention, ranking emitted at end of stream.
    TopK,
    /// Best-k retention, ranking updates emitted incrementally.
    ITopK,
    /// Terminal consumption.
    Sink,
}

impl OperatorKind {
    /// Whether this kind has no upstream edges.
    #[must_use]
    pub fn is_source(&self) -> bool {
        matches!(self, Self::Source)
    }

    /// Whether this kind has no downstream edges.
    #[must_use]
    pub fn is_sink(&self) -> bool {
        matches!(self, Self::Sink)
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Source => "source",
            Self::Map => "map",
            Self::Filter => "filter",
            Self::FlatMap => "flat_map",
            Self::KeyBy => "key_by",
            Self::Window => "window",
            Self::Aggregate => "aggregate",
            Self::Join => "join",
            Self::TopK => "top_k",
            Self::ITopK => "incremental_top_k",
            Self::Sink => "sink",
        };
        f.write_str(s)
    }
}

/// Shared operator plumbing: identity, counters, lifecycle flags, outbox.
///
/// Counters are atomic so metrics readers may observe them while a pooled
/// worker holds the operator.
#[derive(Debug)]
pub struct OperatorCore {
    name: String,
    kind: OperatorKind,
    processed: AtomicU64,
    emitted: AtomicU64,
    errors: AtomicU64,
    outbox: Emitted,
    opened: bool,
    closed: bool,
}

impl OperatorCore {
    /// Creates the shared plumbing for an operator.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: OperatorKind) -> Self {
        Self {
            name: name.into(),
            kind,
            processed: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            outbox: SmallVec::new(),
            opened: false,
            closed: false,
        }
    }

    /// Operator name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operator kind.
    #[must_use]
    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    /// Enqueues a message onto the outgoing edge set and bumps the emitted
    /// counter. The scheduler observes the emission via `take_emitted` and
    /// broadcasts it along every outgoing edge.
    pub fn emit(&mut self, message: Message) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        self.outbox.push(message);
    }

    /// Counts one processed input.
    pub fn count_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a trapped function failure: error counter plus a log line
    /// naming the operator, the function kind, and the error.
    pub fn record_failure(&self, function_kind: FunctionKind, err: &FunctionError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            operator = %self.name,
            function = %function_kind,
            error = %err,
            "function failure trapped; record discarded"
        );
    }

    /// Records an invocation against an operator whose function slot is
    /// empty.
    pub fn record_not_configured(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            operator = %self.name,
            kind = %self.kind,
            "process invoked with no function configured"
        );
    }
}

/// Flow-control node contract.
///
/// Implementors supply [`Operator::core`]/[`Operator::core_mut`] plus the
/// per-variant hooks; identity, counters, outbox draining, and idempotent
/// lifecycle come for free.
pub trait Operator: Send {
    /// Shared plumbing, read side.
    fn core(&self) -> &OperatorCore;

    /// Shared plumbing, write side.
    fn core_mut(&mut self) -> &mut OperatorCore;

    /// Variant-specific `open` work; delegates to the function's `init`.
    ///
    /// # Errors
    ///
    /// A failure aborts graph start-up as a resource error.
    fn on_open(&mut self) -> Result<(), FunctionError> {
        Ok(())
    }

    /// Variant-specific `close` work; delegates to the function's `close`.
    ///
    /// # Errors
    ///
    /// A failure is logged by the engine; shutdown continues.
    fn on_close(&mut self) -> Result<(), FunctionError> {
        Ok(())
    }

    /// One invocation: zero (source) or one (non-source) input message.
    /// `slot` identifies the input edge for multi-input operators. Returns
    /// `true` iff at least one downstream message was emitted.
    fn process(&mut self, input: Option<Message>, slot: usize) -> bool;

    /// End-of-stream flush for operators with buffered state. Runs in
    /// topological order after every source is exhausted and before any
    /// `close`. Returns `true` iff something was emitted.
    fn finish(&mut self) -> bool {
        false
    }

    /// Source exhaustion probe; non-sources always answer `false`.
    fn has_more(&mut self) -> bool {
        false
    }

    // ---- Provided plumbing ----

    /// Operator name.
    fn name(&self) -> &str {
        self.core().name()
    }

    /// Operator kind.
    fn kind(&self) -> OperatorKind {
        self.core().kind()
    }

    /// Idempotent lifecycle entry; the engine calls this once per run in
    /// topological order before the first `process`.
    ///
    /// # Errors
    ///
    /// Propagates the function's `init` failure.
    fn open(&mut self) -> Result<(), FunctionError> {
        if self.core().opened {
            return Ok(());
        }
        self.on_open()?;
        self.core_mut().opened = true;
        Ok(())
    }

    /// Idempotent lifecycle exit; the engine calls this once per run in
    /// reverse topological order after the last `process`.
    ///
    /// # Errors
    ///
    /// Propagates the function's `close` failure.
    fn close(&mut self) -> Result<(), FunctionError> {
        if self.core().closed || !self.core().opened {
            self.core_mut().closed = true;
            return Ok(());
        }
        self.on_close()?;
        self.core_mut().closed = true;
        Ok(())
    }

    /// Drains the outbox filled by `emit` since the last drain.
    fn take_emitted(&mut self) -> Emitted {
        std::mem::take(&mut self.core_mut().outbox)
    }

    /// Messages processed so far.
    fn processed_count(&self) -> u64 {
        self.core().processed.load(Ordering::Relaxed)
    }

    /// Messages emitted downstream so far.
    fn output_count(&self) -> u64 {
        self.core().emitted.load(Ordering::Relaxed)
    }

    /// Trapped failures so far.
    fn error_count(&self) -> u64 {
        self.core().errors.load(Ordering::Relaxed)
    }

    /// Zeroes all three counters; the only way they shrink.
    fn reset_counters(&self) {
        let core = self.core();
        core.processed.store(0, Ordering::Relaxed);
        core.emitted.store(0, Ordering::Relaxed);
        core.errors.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        core: OperatorCore,
    }

    impl Operator for Probe {
        fn core(&self) -> &OperatorCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut OperatorCore {
            &mut self.core
        }

        fn process(&mut self, input: Option<Message>, _slot: usize) -> bool {
            self.core.count_processed();
            if let Some(msg) = input {
                self.core.emit(msg);
                return true;
            }
            false
        }
    }

    #[test]
    fn counters_track_process_and_emit() {
        let mut op = Probe { core: OperatorCore::new("probe", OperatorKind::Map) };
        assert!(op.process(Some(Message::text(1, "a")), 0));
        assert!(!op.process(None, 0));

        assert_eq!(op.processed_count(), 2);
        assert_eq!(op.output_count(), 1);
        assert_eq!(op.error_count(), 0);

        let emitted = op.take_emitted();
        assert_eq!(emitted.len(), 1);
        assert!(op.take_emitted().is_empty());
    }

    #[test]
    fn reset_counters_is_the_only_shrink() {
        let mut op = Probe { core: OperatorCore::new("probe", OperatorKind::Map) };
        op.process(Some(Message::text(1, "a")), 0);
        op.reset_counters();
        assert_eq!(op.processed_count(), 0);
        assert_eq!(op.output_count(), 0);
    }

    #[test]
    fn open_close_are_idempotent() {
        let mut op = Probe { core: OperatorCore::new("probe", OperatorKind::Map) };
        op.open().unwrap();
        op.open().unwrap();
        op.close().unwrap();
        op.close().unwrap();
        assert!(op.core().opened);
        assert!(op.core().closed);
    }
}
