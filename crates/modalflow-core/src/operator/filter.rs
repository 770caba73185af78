//! Filter operator: forwards the input message unmodified or drops it.

use crate::function::{FilterFunction, FunctionKind};
use crate::message::{FunctionResponse, Message};

use super::{Operator, OperatorCore, OperatorKind};

/// Conditional pass-through node. The function returns a subsequence of the
/// input; with single-message invocations that is 0 or 1 messages, and the
/// operator forwards at most one.
pub struct FilterOperator {
    core: OperatorCore,
    function: Option<Box<dyn FilterFunction>>,
}

impl FilterOperator {
    /// Creates a filter operator around its function.
    #[must_use]
    pub fn new(name: impl Into<String>, function: Box<dyn FilterFunction>) -> Self {
        Self { core: OperatorCore::new(name, OperatorKind::Filter), function: Some(function) }
    }

    /// Creates an unconfigured filter operator.
    #[must_use]
    pub fn with_name(name: impl Into<String>) -> Self {
        Self { core: OperatorCore::new(name, OperatorKind::Filter), function: None }
    }

    /// Attaches the filter function.
    pub fn set_function(&mut self, function: Box<dyn FilterFunction>) {
        self.function = Some(function);
    }
}

impl Operator for FilterOperator {
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
                let mut iter = output.into_iter();
                if let Some(kept) = iter.next() {
                    if iter.next().is_some() {
                        tracing::debug!(
                            operator = %self.core.name(),
                            "filter function returned more than one message; extras dropped"
                        );
                    }
                    self.core.emit(kept);
                    true
                } else {
                    false
                }
            }
            Err(err) => {
                self.core.record_failure(FunctionKind::Filter, &err);
                false
            }
        }
    }
}
