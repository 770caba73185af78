//! Join operator: pairs records from two input slots.
//!
//! Each input slot feeds a bounded FIFO buffer. Whenever both buffers are
//! non-empty, one pair is dequeued and handed to the two-input function.
//! Overflowing a buffer drops its oldest record and counts an operator
//! error.

use std::collections::VecDeque;

use crate::function::{FunctionError, FunctionKind, JoinFunction};
use crate::message::{FunctionResponse, Message};

use super::{Operator, OperatorCore, OperatorKind};

/// Default per-slot buffer capacity.
pub const DEFAULT_JOIN_BUFFER: usize = 1024;

/// Two-input pairing node.
pub struct JoinOperator {
    core: OperatorCore,
    function: Option<Box<dyn JoinFunction>>,
    capacity: usize,
    left: VecDeque<Message>,
    right: VecDeque<Message>,
}

impl JoinOperator {
    /// Creates a join operator with the default buffer capacity.
    #[must_use]
    pub fn new(name: impl Into<String>, function: Box<dyn JoinFunction>) -> Self {
        Self::with_capacity(name, function, DEFAULT_JOIN_BUFFER)
    }

    /// Creates a join operator with an explicit per-slot buffer capacity.
    /// A zero capacity is promoted to one slot.
    #[must_use]
    pub fn with_capacity(
        name: impl Into<String>,
        function: Box<dyn JoinFunction>,
        capacity: usize,
    ) -> Self {
        Self {
            core: OperatorCore::new(name, OperatorKind::Join),
            function: Some(function),
            capacity: capacity.max(1),
            left: VecDeque::new(),
            right: VecDeque::new(),
        }
    }

    /// Buffered record count for an input slot.
    #[must_use]
    pub fn buffered(&self, slot: usize) -> usize {
        if slot == 0 { self.left.len() } else { self.right.len() }
    }

    fn push_bounded(&mut self, slot: usize, message: Message) {
        let buffer = if slot == 0 { &mut self.left } else { &mut self.right };
        if buffer.len() == self.capacity {
            buffer.pop_front();
            self.core.record_failure(
                FunctionKind::Join,
                &FunctionError::record(format!("slot {slot} buffer full; oldest record dropped")),
            );
        }
        buffer.push_back(message);
    }
}

impl Operator for JoinOperator {
    fn core(&self) -> &OperatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperatorCore {
        &mut self.core
    }

    fn process(&mut self, input: Option<Message>, slot: usize) -> bool {
        if self.function.is_none() {
            self.core.record_not_configured();
            return false;
        }
        let Some(message) = input else {
            return false;
        };
        if slot > 1 {
            self.core.record_failure(
                FunctionKind::Join,
                &FunctionError::record(format!("record arrived on unexpected slot {slot}")),
            );
            return false;
        }

        self.core.count_processed();
        self.push_bounded(slot, message);

        let mut emitted = false;
        while !self.left.is_empty() && !self.right.is_empty() {
            // Both non-empty, so both pops succeed.
            let Some(l) = self.left.pop_front() else { break };
            let Some(r) = self.right.pop_front() else { break };
            let Some(function) = self.function.as_mut() else { break };
            match function
                .execute(FunctionResponse::from_message(l), FunctionResponse::from_message(r))
            {
                Ok(output) => {
                    for msg in output {
                        self.core.emit(msg);
                        emitted = true;
                    }
                }
                Err(err) => {
                    self.core.record_failure(FunctionKind::Join, &err);
                }
            }
        }
        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{FunctionResult, JoinFunction};

    struct ConcatJoin;

    impl JoinFunction for ConcatJoin {
        fn name(&self) -> &str {
            "concat"
        }

        fn execute(&mut self, left: FunctionResponse, right: FunctionResponse) -> FunctionResult {
            let mut out = FunctionResponse::new();
            let l = left.into_messages().pop();
            let r = right.into_messages().pop();
            if let (Some(l), Some(r)) = (l, r) {
                let text =
                    format!("{}|{}", l.as_text().unwrap_or_default(), r.as_text().unwrap_or_default());
                out.add(Message::text(l.uid(), text));
            }
            Ok(out)
        }
    }

    #[test]
    fn pairs_across_slots_in_fifo_order() {
        let mut op = JoinOperator::new("join", Box::new(ConcatJoin));

        assert!(!op.process(Some(Message::text(1, "a")), 0));
        assert!(!op.process(Some(Message::text(2, "b")), 0));
        assert_eq!(op.buffered(0), 2);

        assert!(op.process(Some(Message::text(10, "x")), 1));
        let out = op.take_emitted();
        assert_eq!(out[0].as_text(), Some("a|x"));
        assert_eq!(op.buffered(0), 1);

        assert!(op.process(Some(Message::text(11, "y")), 1));
        let out = op.take_emitted();
        assert_eq!(out[0].as_text(), Some("b|y"));
        assert_eq!(op.buffered(0), 0);
        assert_eq!(op.buffered(1), 0);
    }

    #[test]
    fn overflow_drops_oldest_and_counts() {
        let mut op = JoinOperator::with_capacity("join", Box::new(ConcatJoin), 2);
        op.process(Some(Message::text(1, "a")), 0);
        op.process(Some(Message::text(2, "b")), 0);
        op.process(Some(Message::text(3, "c")), 0);

        assert_eq!(op.buffered(0), 2);
        assert_eq!(op.error_count(), 1);

        // Oldest (uid 1) was dropped: the first pair uses uid 2.
        op.process(Some(Message::text(10, "x")), 1);
        let out = op.take_emitted();
        assert_eq!(out[0].as_text(), Some("b|x"));
    }

    #[test]
    fn unexpected_slot_is_an_error() {
        let mut op = JoinOperator::new("join", Box::new(ConcatJoin));
        assert!(!op.process(Some(Message::text(1, "a")), 2));
        assert_eq!(op.error_count(), 1);
    }
}
