//! Map operator: one message in, the function's transformed messages out.

use crate::function::{FunctionKind, MapFunction};
use crate::message::{FunctionResponse, Message};

use super::{Operator, OperatorCore, OperatorKind};

/// One-to-one transformation node.
pub struct MapOperator {
    core: OperatorCore,
    function: Option<Box<dyn MapFunction>>,
}

impl MapOperator {
    /// Creates a map operator around its function.
    #[must_use]
    pub fn new(name: impl Into<String>, function: Box<dyn MapFunction>) -> Self {
        Self { core: OperatorCore::new(name, OperatorKind::Map), function: Some(function) }
    }

    /// Creates an unconfigured map operator.
    #[must_use]
    pub fn with_name(name: impl Into<String>) -> Self {
        Self { core: OperatorCore::new(name, OperatorKind::Map), function: None }
    }

    /// Attaches the map function.
    pub fn set_function(&mut self, function: Box<dyn MapFunction>) {
        self.function = Some(function);
    }
}

impl Operator for MapOperator {
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
                self.core.record_failure(FunctionKind::Map, &err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{FnMap, FunctionError};
    use crate::message::Content;

    #[test]
    fn transforms_and_emits() {
        let mut op = MapOperator::new(
            "upper",
            Box::new(FnMap::new("upper", |mut m: Message| {
                let text = m.as_text().unwrap_or_default().to_uppercase();
                m.set_content(Content::Text(text));
                Ok(m)
            })),
        );

        assert!(op.process(Some(Message::text(1, "abc")), 0));
        let out = op.take_emitted();
        assert_eq!(out[0].as_text(), Some("ABC"));
        assert_eq!(out[0].uid(), 1);
        assert_eq!(op.processed_count(), 1);
        assert_eq!(op.output_count(), 1);
    }

    #[test]
    fn failure_is_trapped_and_counted() {
        let mut op = MapOperator::new(
            "flaky",
            Box::new(FnMap::new("flaky", |m: Message| {
                if m.uid() % 2 == 0 {
                    Err(FunctionError::record("even uid"))
                } else {
                    Ok(m)
                }
            })),
        );

        assert!(op.process(Some(Message::text(1, "a")), 0));
        assert!(!op.process(Some(Message::text(2, "b")), 0));
        assert_eq!(op.error_count(), 1);
        assert_eq!(op.processed_count(), 2);
        assert_eq!(op.output_count(), 1);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut op = MapOperator::new(
            "id",
            Box::new(FnMap::new("id", Ok)),
        );
        assert!(!op.process(None, 0));
        assert_eq!(op.processed_count(), 0);
    }
}
