//! Flat-map operator: one message in, zero or more out.

use crate::function::{FunctionKind, MapFunction};
use crate::message::{FunctionResponse, Message};

use super::{Operator, OperatorCore, OperatorKind};

/// One-to-many transformation node. Hosts a [`MapFunction`] without the
/// one-to-one cardinality constraint: whatever the function returns is
/// emitted.
pub struct FlatMapOperator {
    core: OperatorCore,
    function: Option<Box<dyn MapFunction>>,
}

impl FlatMapOperator {
    /// Creates a flat-map operator around its function.
    #[must_use]
    pub fn new(name: impl Into<String>, function: Box<dyn MapFunction>) -> Self {
        Self { core: OperatorCore::new(name, OperatorKind::FlatMap), function: Some(function) }
    }

    /// Creates an unconfigured flat-map operator.
    #[must_use]
    pub fn with_name(name: impl Into<String>) -> Self {
        Self { core: OperatorCore::new(name, OperatorKind::FlatMap), function: None }
    }

    /// Attaches the function.
    pub fn set_function(&mut self, function: Box<dyn MapFunction>) {
        self.function = Some(function);
    }
}

impl Operator for FlatMapOperator {
    fn core(&self) -> &OperatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperatorCore {
        &mut self.core
    }

    fn process(&mut self, input: Option<Message>, _slot: usize) -> bool {
        let Some(function) = self.function.as_mut() else {
            self.core.record_not_configured();
            return false;
        };
        let Some(message) = input else {
            return false;
        };

        self.core.count_processed();
        match function.execute(FunctionResponse::from_message(message)) {
            Ok(output) => {
                let mut emitted = false;
                for msg in output {
                    self.core.emit(msg);
                    emitted = true;
                }
                emitted
            }
            Err(err) => {
                self.core.record_failure(FunctionKind::FlatMap, &err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FnFlatMap;

    #[test]
    fn expands_one_to_many() {
        let mut op = FlatMapOperator::new(
            "words",
            Box::new(FnFlatMap::new("words", |m: Message| {
                let uid = m.uid();
                m.as_text()
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(|w| Message::text(uid, w))
                    .collect()
            })),
        );

        assert!(op.process(Some(Message::text(1, "a b c")), 0));
        assert_eq!(op.take_emitted().len(), 3);
        assert_eq!(op.output_count(), 3);

        assert!(!op.process(Some(Message::text(2, "")), 0));
        assert_eq!(op.output_count(), 3);
    }
}
