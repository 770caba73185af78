//! Sink operator: consumes messages, emits nothing.

use crate::function::{FunctionError, FunctionKind, SinkFunction};
use crate::message::{FunctionResponse, Message};

use super::{Operator, OperatorCore, OperatorKind};

/// Terminal node: no downstream edges.
pub struct SinkOperator {
    core: OperatorCore,
    function: Option<Box<dyn SinkFunction>>,
}

impl SinkOperator {
    /// Creates a sink operator around its function.
    #[must_use]
    pub fn new(name: impl Into<String>, function: Box<dyn SinkFunction>) -> Self {
        Self { core: OperatorCore::new(name, OperatorKind::Sink), function: Some(function) }
    }

    /// Creates an unconfigured sink operator.
    #[must_use]
    pub fn with_name(name: impl Into<String>) -> Self {
        Self { core: OperatorCore::new(name, OperatorKind::Sink), function: None }
    }

    /// Attaches the sink function.
    pub fn set_function(&mut self, function: Box<dyn SinkFunction>) {
        self.function = Some(function);
    }
}

impl Operator for SinkOperator {
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

    fn process(&mut self, input: Option<Message>, _slot: usize) -> bool {
        let Some(function) = self.function.as_mut() else {
            self.core.record_not_configured();
            return false;
        };
        let Some(message) = input else {
            return false;
        };

        self.core.count_processed();
        if let Err(err) = function.execute(FunctionResponse::from_message(message)) {
            self.core.record_failure(FunctionKind::Sink, &err);
        }
        // Sinks never emit downstream.
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FnSink;
    use std::sync::{Arc, Mutex};

    #[test]
    fn consumes_without_emitting() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = Arc::clone(&seen);
        let mut op = SinkOperator::new(
            "collect",
            Box::new(FnSink::new("collect", move |m: Message| {
                handle.lock().unwrap().push(m.uid());
                Ok(())
            })),
        );

        assert!(!op.process(Some(Message::text(1, "a")), 0));
        assert!(!op.process(Some(Message::text(2, "b")), 0));
        assert!(op.take_emitted().is_empty());

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(op.processed_count(), 2);
        assert_eq!(op.output_count(), 0);
    }
}
