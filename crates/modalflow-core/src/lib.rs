//! # modalflow core
//!
//! A streaming dataflow engine for multimodal message processing.
//!
//! This crate provides:
//! - **Messages**: move-only multimodal records with uid, typed payload,
//!   metadata, and processing trace
//! - **Functions**: open-set business-logic units (source, map, filter,
//!   sink, join, key-by, aggregate)
//! - **Operators**: closed-set flow-control shells that host functions and
//!   own counters and lifecycle
//! - **Execution graphs**: DAG registry with cycle detection and
//!   deterministic topological ordering
//! - **Stream engine**: graph submission, lifecycle states, and three
//!   scheduling modes (single-threaded, pooled, cooperative)
//! - **`DataStream`**: a fluent, move-consuming pipeline builder
//!
//! ## Example
//!
//! ```rust,ignore
//! use modalflow_core::{DataStream, ExecutionMode, StreamEngine};
//!
//! let engine = Arc::new(StreamEngine::new(ExecutionMode::SingleThreaded));
//! DataStream::new(engine)
//!     .from_source_fn("lines", read_lines)
//!     .filter_fn("non_empty", |m| !m.as_text().unwrap_or_default().is_empty())
//!     .sink_fn("print", print_message)
//!     .execute()?;
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod datastream;
pub mod engine;
pub mod function;
pub mod graph;
pub mod message;
pub mod operator;

pub use datastream::DataStream;
pub use engine::{
    EngineConfig, EngineError, EngineMetrics, ExecutionMode, GraphId, GraphState, OperatorStats,
    StreamEngine,
};
pub use function::{
    AggregateFunction, FilterFunction, FunctionError, FunctionKind, JoinFunction, KeyByFunction,
    MapFunction, SinkFunction, SourceFunction,
};
pub use graph::{ExecutionGraph, GraphError, OperatorId};
pub use message::{Content, ContentType, FunctionResponse, Message, UidGenerator};
pub use operator::{Operator, OperatorKind};

/// Result type for engine-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Aggregated error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Graph construction errors.
    #[error("graph error: {0}")]
    Graph(#[from] graph::GraphError),

    /// Engine lifecycle and execution errors.
    #[error("engine error: {0}")]
    Engine(#[from] engine::EngineError),

    /// Function-level failures.
    #[error("function error: {0}")]
    Function(#[from] function::FunctionError),
}
