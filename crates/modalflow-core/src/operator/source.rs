//! Source operator: pulls batches from a [`SourceFunction`] and emits them
//! downstream.

use crate::function::{FunctionError, FunctionKind, SourceFunction};
use crate::message::Message;

use super::{Operator, OperatorCore, OperatorKind};

/// Entry-point node: no upstream edges, produces messages from outside the
/// graph.
pub struct SourceOperator {
    core: OperatorCore,
    function: Option<Box<dyn SourceFunction>>,
}

impl SourceOperator {
    /// Creates a source operator around its function.
    #[must_use]
    pub fn new(name: impl Into<String>, function: Box<dyn SourceFunction>) -> Self {
        Self {
            core: OperatorCore::new(name, OperatorKind::Source),
            function: Some(function),
        }
    }

    /// Creates an unconfigured source; `process` reports a configuration
    /// error until a function is attached.
    #[must_use]
    pub fn with_name(name: impl Into<String>) -> Self {
        Self { core: OperatorCore::new(name, OperatorKind::Source), function: None }
    }

    /// Attaches the source function.
    pub fn set_function(&mut self, function: Box<dyn SourceFunction>) {
        self.function = Some(function);
    }
}

impl Operator for SourceOperator {
    fn core(&self) -> &OperatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperatorCore {
        &mut self.core
    }

    fn on_open(&mut self) -> Result<(), FunctionError> {
        match self.function.as_mut() {
            Some(f) => f.init(),
            None => Ok(()),
        }
    }

    fn on_close(&mut self) -> Result<(), FunctionError> {
        match self.function.as_mut() {
            Some(f) => f.close(),
            None => Ok(()),
        }
    }

    fn process(&mut self, _input: Option<Message>, _slot: usize) -> bool {
        let Some(function) = self.function.as_mut() else {
            self.core.record_not_configured();
            return false;
        };
        if !function.has_next() {
            return false;
        }

        self.core.count_processed();
        match function.execute() {
            Ok(batch) => {
                let mut emitted = false;
                for msg in batch {
                    self.core.emit(msg);
                    emitted = true;
                }
                emitted
            }
            Err(err) => {
                self.core.record_failure(FunctionKind::Source, &err);
                false
            }
        }
    }

    fn has_more(&mut self) -> bool {
        self.function.as_mut().is_some_and(|f| f.has_next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FnSource;

    fn counting_source(n: u64) -> SourceOperator {
        let mut next = 0;
        SourceOperator::new(
            "nums",
            Box::new(FnSource::new("nums", move || {
                if next < n {
                    let msg = Message::text(next, format!("m{next}"));
                    next += 1;
                    Some(msg)
                } else {
                    None
                }
            })),
        )
    }

    #[test]
    fn emits_until_exhausted() {
        let mut op = counting_source(3);
        let mut seen = Vec::new();
        while op.has_more() {
            assert!(op.process(None, 0));
            for msg in op.take_emitted() {
                seen.push(msg.uid());
            }
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(!op.process(None, 0));
        assert_eq!(op.output_count(), 3);
    }

    #[test]
    fn unconfigured_source_counts_error() {
        let mut op = SourceOperator::with_name("empty");
        assert!(!op.process(None, 0));
        assert_eq!(op.error_count(), 1);
        assert!(!op.has_more());
    }
}
