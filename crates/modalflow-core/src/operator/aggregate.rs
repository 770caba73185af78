//! Aggregate operator: summarises window batches into metadata messages.
//!
//! Upstream window operators stamp each message with `window.seq`; the
//! aggregate operator groups consecutive messages by that stamp and hands
//! each completed group to its [`AggregateFunction`]. Without a window
//! upstream the whole stream forms one group, summarised at end of
//! stream.

use crate::function::{AggregateFunction, FunctionError, FunctionKind};
use crate::message::{Message, UidGenerator};

use super::window::WINDOW_SEQ;
use super::{Operator, OperatorCore, OperatorKind};

/// Uid base for summary messages, far above typical source uid ranges.
const SUMMARY_UID_BASE: u64 = 1 << 48;

/// Which aggregations a [`StatsAggregate`] computes.
#[derive(Debug, Clone, Copy)]
pub struct AggregateOps {
    /// Record count per window.
    pub count: bool,
    /// Min/max/sum/mean of text content length.
    pub content_length: bool,
    /// Mean quality score over scored messages.
    pub mean_quality: bool,
}

impl Default for AggregateOps {
    fn default() -> Self {
        Self { count: true, content_length: true, mean_quality: true }
    }
}

/// Built-in aggregate function: emits one metadata message per window with
/// the configured statistics.
pub struct StatsAggregate {
    ops: AggregateOps,
    uids: UidGenerator,
}

impl StatsAggregate {
    /// Creates the aggregator for the given operation set.
    #[must_use]
    pub fn new(ops: AggregateOps) -> Self {
        Self { ops, uids: UidGenerator::with_base(SUMMARY_UID_BASE) }
    }
}

impl AggregateFunction for StatsAggregate {
    fn name(&self) -> &str {
        "stats"
    }

    #[allow(clippy::cast_precision_loss)]
    fn aggregate(&mut self, window: &[Message]) -> Result<Option<Message>, FunctionError> {
        if window.is_empty() {
            return Ok(None);
        }
        let mut summary = Message::metadata_only(self.uids.next_uid());

        if let Some(seq) = window[0].metadata(WINDOW_SEQ) {
            summary.set_metadata(WINDOW_SEQ, seq);
        }
        if self.ops.count {
            summary.set_metadata("agg.count", window.len().to_string());
        }
        if self.ops.content_length {
            let lengths: Vec<usize> =
                window.iter().map(|m| m.as_text().map_or(0, str::len)).collect();
            let sum: usize = lengths.iter().sum();
            let min = lengths.iter().copied().min().unwrap_or(0);
            let max = lengths.iter().copied().max().unwrap_or(0);
            summary.set_metadata("agg.len.min", min.to_string());
            summary.set_metadata("agg.len.max", max.to_string());
            summary.set_metadata("agg.len.sum", sum.to_string());
            summary
                .set_metadata("agg.len.mean", format!("{:.3}", sum as f64 / lengths.len() as f64));
        }
        if self.ops.mean_quality {
            let scores: Vec<f32> = window.iter().filter_map(Message::quality_score).collect();
            if !scores.is_empty() {
                let mean = scores.iter().sum::<f32>() / scores.len() as f32;
                summary.set_metadata("agg.quality.mean", format!("{mean:.3}"));
            }
        }
        Ok(Some(summary))
    }
}

/// Window-batch summarisation node.
pub struct AggregateOperator {
    core: OperatorCore,
    function: Option<Box<dyn AggregateFunction>>,
    current_seq: Option<String>,
    batch: Vec<Message>,
}

impl AggregateOperator {
    /// Creates an aggregate operator around its function.
    #[must_use]
    pub fn new(name: impl Into<String>, function: Box<dyn AggregateFunction>) -> Self {
        Self {
            core: OperatorCore::new(name, OperatorKind::Aggregate),
            function: Some(function),
            current_seq: None,
            batch: Vec::new(),
        }
    }

    /// Creates an aggregate operator computing the given built-in
    /// statistics.
    #[must_use]
    pub fn with_ops(name: impl Into<String>, ops: AggregateOps) -> Self {
        Self::new(name, Box::new(StatsAggregate::new(ops)))
    }

    fn flush(&mut self) -> bool {
        if self.batch.is_empty() {
            return false;
        }
        let Some(function) = self.function.as_mut() else {
            self.batch.clear();
            return false;
        };
        let batch = std::mem::take(&mut self.batch);
        match function.aggregate(&batch) {
            Ok(Some(summary)) => {
                self.core.emit(summary);
                true
            }
            Ok(None) => false,
            Err(err) => {
                self.core.record_failure(FunctionKind::Aggregate, &err);
                false
            }
        }
    }
}

impl Operator for AggregateOperator {
    fn core(&self) -> &OperatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperatorCore {
        &mut self.core
    }

    fn process(&mut self, input: Option<Message>, _slot: usize) -> bool {
        if self.function.is_none() {
            self.core.record_not_configured();
            return false;
        }
        let Some(message) = input else {
            return false;
        };
        self.core.count_processed();

        let seq = message.metadata(WINDOW_SEQ).map(ToOwned::to_owned);
        let mut emitted = false;
        if seq != self.current_seq && !self.batch.is_empty() {
            emitted = self.flush();
        }
        self.current_seq = seq;
        self.batch.push(message);
        emitted
    }

    fn finish(&mut self) -> bool {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windowed(uid: u64, text: &str, seq: &str) -> Message {
        let mut msg = Message::text(uid, text);
        msg.set_metadata(WINDOW_SEQ, seq);
        msg
    }

    #[test]
    fn summarises_on_window_boundary() {
        let mut op = AggregateOperator::with_ops("stats", AggregateOps::default());

        assert!(!op.process(Some(windowed(1, "a", "0")), 0));
        assert!(!op.process(Some(windowed(2, "bb", "0")), 0));
        // First message of window 1 closes window 0.
        assert!(op.process(Some(windowed(3, "ccc", "1")), 0));

        let out = op.take_emitted();
        assert_eq!(out.len(), 1);
        let summary = &out[0];
        assert_eq!(summary.metadata("agg.count"), Some("2"));
        assert_eq!(summary.metadata("agg.len.min"), Some("1"));
        assert_eq!(summary.metadata("agg.len.max"), Some("2"));
        assert_eq!(summary.metadata("agg.len.sum"), Some("3"));
        assert_eq!(summary.metadata(WINDOW_SEQ), Some("0"));
    }

    #[test]
    fn finish_summarises_the_tail() {
        let mut op = AggregateOperator::with_ops("stats", AggregateOps::default());
        op.process(Some(windowed(1, "abcd", "0")), 0);

        assert!(op.finish());
        let out = op.take_emitted();
        assert_eq!(out[0].metadata("agg.count"), Some("1"));
        assert_eq!(out[0].metadata("agg.len.sum"), Some("4"));
        assert!(!op.finish());
    }

    #[test]
    fn unwindowed_stream_forms_one_group() {
        let mut op = AggregateOperator::with_ops("stats", AggregateOps::default());
        for i in 0..5 {
            assert!(!op.process(Some(Message::text(i, "x")), 0));
        }
        assert!(op.finish());
        let out = op.take_emitted();
        assert_eq!(out[0].metadata("agg.count"), Some("5"));
    }

    #[test]
    fn mean_quality_over_scored_messages() {
        let mut op = AggregateOperator::with_ops("stats", AggregateOps::default());
        let mut a = Message::text(1, "a");
        a.set_quality_score(0.4);
        let mut b = Message::text(2, "b");
        b.set_quality_score(0.8);
        op.process(Some(a), 0);
        op.process(Some(b), 0);
        op.finish();

        let out = op.take_emitted();
        assert_eq!(out[0].metadata("agg.quality.mean"), Some("0.600"));
    }
}
