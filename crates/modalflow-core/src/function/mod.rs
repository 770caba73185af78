//! # Function Variants
//!
//! Business-logic units hosted inside operators.
//!
//! Operators own flow control (ingress, emission, counters, lifecycle);
//! functions own message-level logic. Each operator variant stores the
//! matching function trait object, so a kind mismatch between operator and
//! function is unrepresentable.
//!
//! ## Cardinality contracts
//!
//! - [`SourceFunction`]: `execute` takes no input and returns 0..N messages;
//!   an exhausted source answers `has_next() == false`.
//! - [`MapFunction`]: as many messages out as in, order preserved; removing
//!   a position models a nil intermediate result. The flat-map operator
//!   reuses this trait without the one-to-one constraint.
//! - [`FilterFunction`]: an in-order subsequence of the input, retained
//!   messages unmodified.
//! - [`SinkFunction`]: consumes everything, returns nothing.
//! - [`JoinFunction`]: the only two-input variant.
//!
//! Errors from `execute` are recoverable and stay local to one record: the
//! hosting operator counts and logs them, then moves on.

use std::fmt;

use crate::message::{FunctionResponse, Message};

pub mod adapters;

pub use adapters::{FnFilter, FnFlatMap, FnKeyBy, FnMap, FnSink, FnSource};

/// Function variant tag, mirrored by the hosting operator's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Produces messages from outside the graph.
    Source,
    /// One-to-one transformation.
    Map,
    /// In-order subsequence selection.
    Filter,
    /// One-to-many transformation.
    FlatMap,
    /// Partition-key extraction.
    KeyBy,
    /// Window-batch aggregation.
    Aggregate,
    /// Two-input combination.
    Join,
    /// Terminal consumption.
    Sink,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Source => "source",
            Self::Map => "map",
            Self::Filter => "filter",
            Self::FlatMap => "flat_map",
            Self::KeyBy => "key_by",
            Self::Aggregate => "aggregate",
            Self::Join => "join",
            Self::Sink => "sink",
        };
        f.write_str(s)
    }
}

/// Failure inside a function body.
///
/// Recoverable by policy: the operator traps it, increments its error
/// counter, discards the input record, and the run continues. Lifecycle
/// failures (`init`/`close`) are promoted to resource errors by the engine.
#[derive(Debug, thiserror::Error)]
pub enum FunctionError {
    /// The record could not be processed.
    #[error("record rejected: {0}")]
    Record(String),

    /// The function is not in a state where it can run (e.g. `execute`
    /// before `init`).
    #[error("function not ready: {0}")]
    NotReady(String),

    /// Resource acquisition or release failed during `init`/`close`.
    #[error("resource failure: {0}")]
    Resource(String),

    /// An underlying I/O operation failed.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl FunctionError {
    /// Convenience constructor for per-record failures.
    #[must_use]
    pub fn record(msg: impl Into<String>) -> Self {
        Self::Record(msg.into())
    }
}

/// Result alias for function bodies.
pub type FunctionResult = Result<FunctionResponse, FunctionError>;

/// A data source: produces batches of messages until exhausted.
pub trait SourceFunction: Send {
    /// Human-readable function name.
    fn name(&self) -> &str;

    /// Called once before the first `execute`.
    ///
    /// # Errors
    ///
    /// A failure here aborts graph start-up as a resource error.
    fn init(&mut self) -> Result<(), FunctionError> {
        Ok(())
    }

    /// Produces the next batch of messages. The engine only calls this
    /// after `has_next()` answered true; an empty response means the batch
    /// was empty, not that the stream ended.
    ///
    /// # Errors
    ///
    /// Per-record failures are trapped by the hosting operator.
    fn execute(&mut self) -> FunctionResult;

    /// Whether more data is available. Queried by the engine between
    /// invocations.
    fn has_next(&mut self) -> bool;

    /// Called once after the last `execute`.
    ///
    /// # Errors
    ///
    /// A failure here is logged; shutdown continues.
    fn close(&mut self) -> Result<(), FunctionError> {
        Ok(())
    }
}

/// A one-to-one (or, under a flat-map operator, one-to-many)
/// transformation.
pub trait MapFunction: Send {
    /// Human-readable function name.
    fn name(&self) -> &str;

    /// Transforms the input messages. The returned response owns whatever
    /// the function emits.
    ///
    /// # Errors
    ///
    /// Trapped by the hosting operator; the input record is discarded.
    fn execute(&mut self, input: FunctionResponse) -> FunctionResult;
}

/// An in-order subsequence selection. Retained messages must pass through
/// unmodified.
pub trait FilterFunction: Send {
    /// Human-readable function name.
    fn name(&self) -> &str;

    /// Returns the retained subsequence of `input`, original order.
    ///
    /// # Errors
    ///
    /// Trapped by the hosting operator; the input record is discarded.
    fn execute(&mut self, input: FunctionResponse) -> FunctionResult;
}

/// A terminal consumer.
pub trait SinkFunction: Send {
    /// Human-readable function name.
    fn name(&self) -> &str;

    /// Called once before the first `execute`.
    ///
    /// # Errors
    ///
    /// A failure here aborts graph start-up as a resource error.
    fn init(&mut self) -> Result<(), FunctionError> {
        Ok(())
    }

    /// Consumes all input messages.
    ///
    /// # Errors
    ///
    /// Trapped by the hosting operator; the input record is discarded.
    fn execute(&mut self, input: FunctionResponse) -> Result<(), FunctionError>;

    /// Called once after the last `execute`; releases anything `init`
    /// acquired.
    ///
    /// # Errors
    ///
    /// A failure here is logged; shutdown continues.
    fn close(&mut self) -> Result<(), FunctionError> {
        Ok(())
    }
}

/// The only two-input variant; invoked by join operators with one message
/// per side.
pub trait JoinFunction: Send {
    /// Human-readable function name.
    fn name(&self) -> &str;

    /// Combines one left-side and one right-side record.
    ///
    /// # Errors
    ///
    /// Trapped by the hosting operator; both input records are discarded.
    fn execute(&mut self, left: FunctionResponse, right: FunctionResponse) -> FunctionResult;
}

/// Partition-key extraction for key-by operators.
pub trait KeyByFunction: Send {
    /// Human-readable function name.
    fn name(&self) -> &str;

    /// Computes the partition key for a message.
    ///
    /// # Errors
    ///
    /// Trapped by the hosting operator; the input record is discarded.
    fn key(&mut self, message: &Message) -> Result<String, FunctionError>;
}

/// Fold over one window batch, producing at most one summary message.
pub trait AggregateFunction: Send {
    /// Human-readable function name.
    fn name(&self) -> &str;

    /// Summarises a completed window batch. Returning `None` drops the
    /// window.
    ///
    /// # Errors
    ///
    /// Trapped by the hosting operator; the batch is discarded.
    fn aggregate(&mut self, window: &[Message]) -> Result<Option<Message>, FunctionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_names() {
        assert_eq!(FunctionKind::Source.to_string(), "source");
        assert_eq!(FunctionKind::FlatMap.to_string(), "flat_map");
        assert_eq!(FunctionKind::Sink.to_string(), "sink");
    }

    #[test]
    fn record_error_message() {
        let err = FunctionError::record("bad uid");
        assert_eq!(err.to_string(), "record rejected: bad uid");
    }
}
