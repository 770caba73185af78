//! # DataStream API
//!
//! Fluent, move-consuming pipeline construction over a shared engine.
//!
//! Each chained call consumes the stream and yields the updated handle, so
//! a half-built chain cannot be reused. Terminal operations submit the
//! graph once and cache the assigned [`GraphId`]; later calls reuse it.
//!
//! ```rust,ignore
//! let engine = Arc::new(StreamEngine::new(ExecutionMode::SingleThreaded));
//! DataStream::new(Arc::clone(&engine))
//!     .from_source(my_source)
//!     .map_fn("upper", |mut m| { /* ... */ Ok(m) })
//!     .filter_fn("non_empty", |m| !m.as_text().unwrap_or_default().is_empty())
//!     .sink(my_sink)
//!     .execute()?;
//! ```
//!
//! Misuse of the chain (a non-source operation before `from_source`,
//! chaining past `sink`) is recorded as a deferred build error and
//! surfaced by the terminal operation, keeping every intermediate call
//! chainable.

use std::sync::Arc;

use crate::engine::{EngineError, GraphId, GraphState, StreamEngine};
use crate::function::{
    FilterFunction, FnFilter, FnKeyBy, FnMap, FnSink, FnSource, FunctionError, JoinFunction,
    KeyByFunction, MapFunction, SinkFunction, SourceFunction,
};
use crate::graph::{ExecutionGraph, OperatorId};
use crate::message::Message;
use crate::operator::{
    AggregateOperator, AggregateOps, FilterOperator, FlatMapOperator, JoinOperator, KeyByOperator,
    KeyStrategy, MapOperator, Operator, SinkOperator, SourceOperator, TopKOperator,
    WindowOperator, WindowSpec,
};

/// Fluent builder handle: an engine reference, the graph under
/// construction, and the last-appended operator.
pub struct DataStream {
    engine: Arc<StreamEngine>,
    graph: Option<ExecutionGraph>,
    last_operator: Option<OperatorId>,
    graph_id: Option<GraphId>,
    operator_count: usize,
    finalized: bool,
    build_error: Option<EngineError>,
}

impl DataStream {
    /// Creates an empty pipeline bound to an engine.
    #[must_use]
    pub fn new(engine: Arc<StreamEngine>) -> Self {
        Self {
            engine,
            graph: Some(ExecutionGraph::new()),
            last_operator: None,
            graph_id: None,
            operator_count: 0,
            finalized: false,
            build_error: None,
        }
    }

    // ---- Chain operations ----

    /// Starts the pipeline from a source function.
    #[must_use]
    pub fn from_source(mut self, source: impl SourceFunction + 'static) -> Self {
        let name = source.name().to_string();
        if let Some(graph) = self.writable_graph("from_source") {
            let id = graph.add_operator(Box::new(SourceOperator::new(name, Box::new(source))));
            self.last_operator = Some(id);
            self.operator_count += 1;
        }
        self
    }

    /// Starts the pipeline from a producing closure; `None` marks
    /// exhaustion.
    #[must_use]
    pub fn from_source_fn(
        self,
        name: &str,
        produce: impl FnMut() -> Option<Message> + Send + 'static,
    ) -> Self {
        self.from_source(FnSource::new(name, produce))
    }

    /// Appends a one-to-one transformation.
    #[must_use]
    pub fn map(mut self, function: impl MapFunction + 'static) -> Self {
        let name = function.name().to_string();
        self.append(name.clone(), |name| Box::new(MapOperator::new(name, Box::new(function))));
        self
    }

    /// Appends a transforming closure.
    #[must_use]
    pub fn map_fn(
        self,
        name: &str,
        transform: impl FnMut(Message) -> Result<Message, FunctionError> + Send + 'static,
    ) -> Self {
        self.map(FnMap::new(name, transform))
    }

    /// Appends a conditional pass-through.
    #[must_use]
    pub fn filter(mut self, function: impl FilterFunction + 'static) -> Self {
        let name = function.name().to_string();
        self.append(name, |name| Box::new(FilterOperator::new(name, Box::new(function))));
        self
    }

    /// Appends a predicate closure.
    #[must_use]
    pub fn filter_fn(
        self,
        name: &str,
        keep: impl FnMut(&Message) -> bool + Send + 'static,
    ) -> Self {
        self.filter(FnFilter::new(name, keep))
    }

    /// Appends a one-to-many transformation.
    #[must_use]
    pub fn flat_map(mut self, function: impl MapFunction + 'static) -> Self {
        let name = function.name().to_string();
        self.append(name, |name| Box::new(FlatMapOperator::new(name, Box::new(function))));
        self
    }

    /// Appends a partition-key stamping stage.
    #[must_use]
    pub fn key_by(mut self, function: impl KeyByFunction + 'static, strategy: KeyStrategy) -> Self {
        let name = function.name().to_string();
        self.append(name, |name| {
            Box::new(KeyByOperator::new(name, Box::new(function), strategy))
        });
        self
    }

    /// Appends a key-extraction closure.
    #[must_use]
    pub fn key_by_fn(
        self,
        name: &str,
        extract: impl FnMut(&Message) -> String + Send + 'static,
        strategy: KeyStrategy,
    ) -> Self {
        self.key_by(FnKeyBy::new(name, extract), strategy)
    }

    /// Appends a tumbling window stage.
    #[must_use]
    pub fn window(mut self, spec: WindowSpec) -> Self {
        self.append("window".to_string(), |name| Box::new(WindowOperator::new(name, spec)));
        self
    }

    /// Appends a window summarisation stage computing the given built-in
    /// statistics.
    #[must_use]
    pub fn aggregate(mut self, ops: AggregateOps) -> Self {
        self.append("aggregate".to_string(), |name| {
            Box::new(AggregateOperator::with_ops(name, ops))
        });
        self
    }

    /// Appends a best-k stage that emits its ranking at end of stream.
    #[must_use]
    pub fn top_k(mut self, k: usize) -> Self {
        self.append("top_k".to_string(), |name| Box::new(TopKOperator::new(name, k)));
        self
    }

    /// Appends a best-k stage that emits ranking updates incrementally.
    #[must_use]
    pub fn incremental_top_k(mut self, k: usize) -> Self {
        self.append("incremental_top_k".to_string(), |name| {
            Box::new(TopKOperator::incremental(name, k))
        });
        self
    }

    /// Merges another pipeline into this one and joins both ends through
    /// the given two-input function. This stream feeds slot 0, the other
    /// stream slot 1.
    #[must_use]
    pub fn connect(mut self, other: DataStream, function: impl JoinFunction + 'static) -> Self {
        if self.build_error.is_none() {
            if let Some(err) = other.build_error {
                self.build_error = Some(err);
                return self;
            }
        }
        let other_last = other.last_operator;
        let Some(other_graph) = other.graph else {
            self.fail(EngineError::NotConfigured(
                "connect requires a pipeline that has not been submitted".to_string(),
            ));
            return self;
        };

        let name = function.name().to_string();
        let (Some(left_last), Some(other_last)) = (self.last_operator, other_last) else {
            self.fail(EngineError::NotConfigured(
                "connect requires a source on both pipelines".to_string(),
            ));
            return self;
        };

        let wired = match self.writable_graph("connect") {
            None => return self,
            Some(graph) => {
                let mapping = graph.merge_from(other_graph);
                match mapping.get(&other_last) {
                    None => Err(EngineError::Fatal(
                        "merged pipeline lost its tail operator".to_string(),
                    )),
                    Some(&right_last) => {
                        let join =
                            graph.add_operator(Box::new(JoinOperator::new(name, Box::new(function))));
                        graph
                            .connect(left_last, join)
                            .and(graph.connect(right_last, join))
                            .map(|()| join)
                            .map_err(|err| EngineError::Fatal(err.to_string()))
                    }
                }
            }
        };

        match wired {
            Ok(join) => {
                self.last_operator = Some(join);
                self.operator_count += 1;
            }
            Err(err) => self.fail(err),
        }
        self
    }

    /// Terminal: appends a sink and finalizes the graph (validates it and
    /// freezes the chain).
    #[must_use]
    pub fn sink(mut self, function: impl SinkFunction + 'static) -> Self {
        let name = function.name().to_string();
        self.append(name, |name| Box::new(SinkOperator::new(name, Box::new(function))));
        self.finalize();
        self
    }

    /// Terminal: appends a consuming closure as the sink.
    #[must_use]
    pub fn sink_fn(
        self,
        name: &str,
        consume: impl FnMut(Message) -> Result<(), FunctionError> + Send + 'static,
    ) -> Self {
        self.sink(FnSink::new(name, consume))
    }

    // ---- Execution control ----

    /// Submits the graph (first call only) and drives it to completion.
    ///
    /// # Errors
    ///
    /// Surfaces deferred build errors, validation failures, and drive
    /// failures.
    pub fn execute(&mut self) -> Result<GraphId, EngineError> {
        let id = self.submit()?;
        self.engine.execute(id)?;
        Ok(id)
    }

    /// Submits the graph (first call only) and starts an asynchronous
    /// drive.
    ///
    /// # Errors
    ///
    /// Surfaces deferred build errors and validation failures.
    pub fn execute_async(&mut self) -> Result<GraphId, EngineError> {
        let id = self.submit()?;
        self.engine.execute_async(id)?;
        Ok(id)
    }

    /// Stops the submitted graph, if any; answers its resulting state.
    pub fn stop(&self) -> GraphState {
        self.graph_id.map_or(GraphState::Unknown, |id| self.engine.stop(id))
    }

    // ---- Introspection ----

    /// Number of operators appended so far.
    #[must_use]
    pub fn operator_count(&self) -> usize {
        self.operator_count
    }

    /// ID of the last-appended operator.
    #[must_use]
    pub fn last_operator_id(&self) -> Option<OperatorId> {
        self.last_operator
    }

    /// Graph ID assigned at submission, if the pipeline was submitted.
    #[must_use]
    pub fn graph_id(&self) -> Option<GraphId> {
        self.graph_id
    }

    /// Whether the submitted graph is currently running.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.graph_id.is_some_and(|id| self.engine.is_graph_running(id))
    }

    // ---- Internals ----

    /// Appends a non-source operator and wires it to the previous tail.
    fn append(
        &mut self,
        name: String,
        build: impl FnOnce(String) -> Box<dyn Operator>,
    ) {
        let Some(last) = self.last_operator else {
            self.fail(EngineError::NotConfigured(format!(
                "'{name}' requires a source; call from_source first"
            )));
            return;
        };
        let Some(graph) = self.writable_graph(&name) else {
            return;
        };
        let id = graph.add_operator(build(name));
        match graph.connect(last, id) {
            Ok(()) => {
                self.last_operator = Some(id);
                self.operator_count += 1;
            }
            Err(err) => self.fail(EngineError::Fatal(err.to_string())),
        }
    }

    /// The graph, if the chain is still open for mutation.
    fn writable_graph(&mut self, operation: &str) -> Option<&mut ExecutionGraph> {
        if self.build_error.is_some() {
            return None;
        }
        if self.finalized {
            self.build_error = Some(EngineError::NotConfigured(format!(
                "'{operation}' after the pipeline was finalized"
            )));
            return None;
        }
        if self.graph.is_none() {
            self.build_error = Some(EngineError::NotConfigured(format!(
                "'{operation}' after the pipeline was submitted"
            )));
            return None;
        }
        self.graph.as_mut()
    }

    fn fail(&mut self, err: EngineError) {
        if self.build_error.is_none() {
            self.build_error = Some(err);
        }
    }

    fn finalize(&mut self) {
        if self.finalized || self.build_error.is_some() {
            return;
        }
        if let Some(graph) = &self.graph {
            if !graph.validate() {
                self.build_error =
                    Some(EngineError::InvalidGraph("pipeline graph has a cycle".to_string()));
                return;
            }
        }
        self.finalized = true;
    }

    /// Submits once and caches the graph ID.
    fn submit(&mut self) -> Result<GraphId, EngineError> {
        if let Some(err) = self.build_error.take() {
            // Surface the deferred failure; the chain stays broken.
            self.build_error = Some(match &err {
                EngineError::InvalidGraph(m) => EngineError::InvalidGraph(m.clone()),
                EngineError::NotConfigured(m) => EngineError::NotConfigured(m.clone()),
                other => EngineError::Fatal(other.to_string()),
            });
            return Err(err);
        }
        if let Some(id) = self.graph_id {
            return Ok(id);
        }
        let graph = self.graph.take().ok_or_else(|| {
            EngineError::Fatal("pipeline graph already consumed".to_string())
        })?;
        let id = self.engine.submit(graph)?;
        self.graph_id = Some(id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExecutionMode;
    use crate::function::FunctionResult;
    use crate::message::FunctionResponse;
    use parking_lot::Mutex;

    fn engine() -> Arc<StreamEngine> {
        Arc::new(StreamEngine::new(ExecutionMode::SingleThreaded))
    }

    fn counting_source(n: u64) -> impl FnMut() -> Option<Message> + Send {
        let mut next = 0;
        move || {
            if next < n {
                let msg = Message::text(next, format!("m{next}"));
                next += 1;
                Some(msg)
            } else {
                None
            }
        }
    }

    #[test]
    fn identity_pipeline_round_trips_the_source() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&collected);

        let mut stream = DataStream::new(engine())
            .from_source_fn("nums", counting_source(5))
            .map_fn("identity", Ok)
            .sink_fn("collect", move |m| {
                store.lock().push(m.uid());
                Ok(())
            });

        stream.execute().unwrap();
        assert_eq!(*collected.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(stream.operator_count(), 3);
    }

    #[test]
    fn const_true_filter_matches_identity_map() {
        let run = |use_filter: bool| {
            let collected = Arc::new(Mutex::new(Vec::new()));
            let store = Arc::clone(&collected);
            let stream = DataStream::new(engine()).from_source_fn("nums", counting_source(4));
            let stream = if use_filter {
                stream.filter_fn("all", |_| true)
            } else {
                stream.map_fn("identity", Ok)
            };
            let mut stream = stream.sink_fn("collect", move |m| {
                store.lock().push(m.uid());
                Ok(())
            });
            stream.execute().unwrap();
            drop(stream);
            Arc::try_unwrap(collected).map(parking_lot::Mutex::into_inner).unwrap()
        };

        assert_eq!(run(true), run(false));
    }

    #[test]
    fn transform_before_source_is_deferred_not_configured() {
        let mut stream = DataStream::new(engine())
            .map_fn("orphan", Ok)
            .sink_fn("collect", |_| Ok(()));

        let err = stream.execute().unwrap_err();
        assert!(matches!(err, EngineError::NotConfigured(_)));
    }

    #[test]
    fn chaining_after_sink_is_rejected() {
        let mut stream = DataStream::new(engine())
            .from_source_fn("nums", counting_source(1))
            .sink_fn("collect", |_| Ok(()))
            .map_fn("late", Ok);

        assert!(matches!(stream.execute(), Err(EngineError::NotConfigured(_))));
    }

    #[test]
    fn terminal_operations_submit_once() {
        let mut stream = DataStream::new(engine())
            .from_source_fn("nums", counting_source(2))
            .sink_fn("collect", |_| Ok(()));

        let first = stream.execute().unwrap();
        assert_eq!(stream.graph_id(), Some(first));
        // A second execute reuses the cached ID (and fails on state, not
        // on submission).
        assert!(stream.execute().is_err());
        assert_eq!(stream.graph_id(), Some(first));
    }

    #[test]
    fn windowed_aggregation_pipeline() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&collected);

        let mut stream = DataStream::new(engine())
            .from_source_fn("nums", counting_source(6))
            .window(WindowSpec::Count(3))
            .aggregate(AggregateOps::default())
            .sink_fn("collect", move |m| {
                store.lock().push(m.metadata("agg.count").unwrap_or_default().to_string());
                Ok(())
            });

        stream.execute().unwrap();
        assert_eq!(*collected.lock(), vec!["3".to_string(), "3".to_string()]);
    }

    #[test]
    fn top_k_pipeline_ranks_by_quality() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&collected);
        let scores = [0.1_f32, 0.9, 0.5, 0.7];
        let mut next = 0_usize;

        let mut stream = DataStream::new(engine())
            .from_source_fn("scored", move || {
                if next < scores.len() {
                    let mut msg = Message::text(next as u64, "x");
                    msg.set_quality_score(scores[next]);
                    next += 1;
                    Some(msg)
                } else {
                    None
                }
            })
            .top_k(2)
            .sink_fn("collect", move |m| {
                store.lock().push(m.uid());
                Ok(())
            });

        stream.execute().unwrap();
        assert_eq!(*collected.lock(), vec![1, 3]);
    }

    struct PairJoin;

    impl JoinFunction for PairJoin {
        fn name(&self) -> &str {
            "pair"
        }

        fn execute(&mut self, left: FunctionResponse, right: FunctionResponse) -> FunctionResult {
            let mut out = FunctionResponse::new();
            let l = left.into_messages().pop();
            let r = right.into_messages().pop();
            if let (Some(l), Some(r)) = (l, r) {
                let text =
                    format!("{}+{}", l.as_text().unwrap_or_default(), r.as_text().unwrap_or_default());
                out.add(Message::text(l.uid(), text));
            }
            Ok(out)
        }
    }

    #[test]
    fn connect_joins_two_pipelines() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&collected);
        let engine = engine();

        let left = DataStream::new(Arc::clone(&engine)).from_source_fn("left", {
            let mut items = vec![(0_u64, "l0"), (1, "l1")].into_iter();
            move || items.next().map(|(uid, text)| Message::text(uid, text))
        });
        let right = DataStream::new(Arc::clone(&engine)).from_source_fn("right", {
            let mut items = vec![(10_u64, "r0"), (11, "r1")].into_iter();
            move || items.next().map(|(uid, text)| Message::text(uid, text))
        });

        let mut stream = left.connect(right, PairJoin).sink_fn("collect", move |m| {
            store.lock().push(m.as_text().unwrap_or_default().to_string());
            Ok(())
        });

        stream.execute().unwrap();
        assert_eq!(*collected.lock(), vec!["l0+r0".to_string(), "l1+r1".to_string()]);
    }

    #[test]
    fn stop_without_submission_is_unknown() {
        let stream = DataStream::new(engine()).from_source_fn("nums", counting_source(1));
        assert_eq!(stream.stop(), GraphState::Unknown);
        assert!(!stream.is_executing());
    }
}
