//! Key-by operator: stamps each message with its partition key and
//! forwards it.
//!
//! Delivery along edges stays broadcast; the stamped key travels with the
//! message so downstream stages (or a future partitioned scheduler) can
//! group by it.

use std::fmt;

use crate::function::{FunctionKind, KeyByFunction};
use crate::message::Message;

use super::{Operator, OperatorCore, OperatorKind};

/// Metadata key carrying the extracted partition key.
pub const PARTITION_KEY: &str = "partition.key";

/// Metadata key carrying the partitioning strategy label.
pub const PARTITION_STRATEGY: &str = "partition.strategy";

/// Partitioning strategy label recorded on stamped messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    /// Key-hash partitioning.
    #[default]
    Hash,
    /// Rotating assignment.
    RoundRobin,
    /// Every partition sees every record.
    Broadcast,
}

impl fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Hash => "hash",
            Self::RoundRobin => "round_robin",
            Self::Broadcast => "broadcast",
        };
        f.write_str(s)
    }
}

/// Partition-key stamping node.
pub struct KeyByOperator {
    core: OperatorCore,
    function: Option<Box<dyn KeyByFunction>>,
    strategy: KeyStrategy,
}

impl KeyByOperator {
    /// Creates a key-by operator around its key extractor.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        function: Box<dyn KeyByFunction>,
        strategy: KeyStrategy,
    ) -> Self {
        Self {
            core: OperatorCore::new(name, OperatorKind::KeyBy),
            function: Some(function),
            strategy,
        }
    }

    /// Creates an unconfigured key-by operator.
    #[must_use]
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            core: OperatorCore::new(name, OperatorKind::KeyBy),
            function: None,
            strategy: KeyStrategy::default(),
        }
    }

    /// The configured strategy label.
    #[must_use]
    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }
}

impl Operator for KeyByOperator {
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
        let Some(mut message) = input else {
            return false;
        };

        self.core.count_processed();
        match function.key(&message) {
            Ok(key) => {
                message.set_metadata(PARTITION_KEY, key);
                message.set_metadata(PARTITION_STRATEGY, self.strategy.to_string());
                self.core.emit(message);
                true
            }
            Err(err) => {
                self.core.record_failure(FunctionKind::KeyBy, &err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FnKeyBy;

    #[test]
    fn stamps_key_and_strategy() {
        let mut op = KeyByOperator::new(
            "by-parity",
            Box::new(FnKeyBy::new("parity", |m: &Message| {
                if m.uid() % 2 == 0 { "even".into() } else { "odd".into() }
            })),
            KeyStrategy::Hash,
        );

        assert!(op.process(Some(Message::text(4, "x")), 0));
        let out = op.take_emitted();
        assert_eq!(out[0].metadata(PARTITION_KEY), Some("even"));
        assert_eq!(out[0].metadata(PARTITION_STRATEGY), Some("hash"));
    }
}
