//! Window operator: tumbling count- or time-based batching.
//!
//! Messages buffer until the window closes, then the whole batch is
//! emitted downstream, each message stamped with the window sequence
//! number and batch size. The open window flushes at end of stream via
//! [`Operator::finish`].

use crate::message::Message;

use super::{Operator, OperatorCore, OperatorKind};

/// Metadata key carrying the window sequence number.
pub const WINDOW_SEQ: &str = "window.seq";

/// Metadata key carrying the number of messages in the window batch.
pub const WINDOW_LEN: &str = "window.len";

/// Tumbling window specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSpec {
    /// Close after `n` messages.
    Count(usize),
    /// Close when a message's timestamp crosses the window span
    /// (milliseconds); windows are aligned to the first buffered message.
    Time(u64),
}

impl WindowSpec {
    fn normalized(self) -> Self {
        match self {
            Self::Count(n) => Self::Count(n.max(1)),
            Self::Time(ms) => Self::Time(ms.max(1)),
        }
    }
}

/// Tumbling window node. Pure flow control: batching is configured by the
/// [`WindowSpec`] rather than delegated to a function.
pub struct WindowOperator {
    core: OperatorCore,
    spec: WindowSpec,
    buffer: Vec<Message>,
    window_start: Option<u64>,
    seq: u64,
}

impl WindowOperator {
    /// Creates a window operator for the given specification.
    #[must_use]
    pub fn new(name: impl Into<String>, spec: WindowSpec) -> Self {
        Self {
            core: OperatorCore::new(name, OperatorKind::Window),
            spec: spec.normalized(),
            buffer: Vec::new(),
            window_start: None,
            seq: 0,
        }
    }

    /// The window specification.
    #[must_use]
    pub fn spec(&self) -> WindowSpec {
        self.spec
    }

    /// Number of messages buffered in the open window.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn flush(&mut self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        let len = self.buffer.len();
        let seq = self.seq;
        self.seq += 1;
        self.window_start = None;
        for mut msg in self.buffer.drain(..) {
            msg.set_metadata(WINDOW_SEQ, seq.to_string());
            msg.set_metadata(WINDOW_LEN, len.to_string());
            self.core.emit(msg);
        }
        true
    }
}

impl Operator for WindowOperator {
    fn core(&self) -> &OperatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperatorCore {
        &mut self.core
    }

    fn process(&mut self, input: Option<Message>, _slot: usize) -> bool {
        let Some(message) = input else {
            return false;
        };
        self.core.count_processed();

        let mut emitted = false;
        match self.spec {
            WindowSpec::Count(n) => {
                self.buffer.push(message);
                if self.buffer.len() >= n {
                    emitted = self.flush();
                }
            }
            WindowSpec::Time(span) => {
                let start = *self.window_start.get_or_insert_with(|| message.timestamp());
                if message.timestamp() >= start.saturating_add(span) {
                    emitted = self.flush();
                    self.window_start = Some(message.timestamp());
                }
                self.buffer.push(message);
            }
        }
        emitted
    }

    fn finish(&mut self) -> bool {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_window_flushes_at_capacity() {
        let mut op = WindowOperator::new("w3", WindowSpec::Count(3));
        assert!(!op.process(Some(Message::text(1, "a")), 0));
        assert!(!op.process(Some(Message::text(2, "b")), 0));
        assert!(op.process(Some(Message::text(3, "c")), 0));

        let out = op.take_emitted();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|m| m.metadata(WINDOW_SEQ) == Some("0")));
        assert!(out.iter().all(|m| m.metadata(WINDOW_LEN) == Some("3")));
        assert_eq!(op.buffered(), 0);
    }

    #[test]
    fn finish_flushes_the_open_window() {
        let mut op = WindowOperator::new("w3", WindowSpec::Count(3));
        op.process(Some(Message::text(1, "a")), 0);
        op.process(Some(Message::text(2, "b")), 0);

        assert!(op.finish());
        let out = op.take_emitted();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|m| m.metadata(WINDOW_LEN) == Some("2")));
        assert!(!op.finish());
    }

    #[test]
    fn window_seq_increments_per_flush() {
        let mut op = WindowOperator::new("w1", WindowSpec::Count(1));
        op.process(Some(Message::text(1, "a")), 0);
        op.process(Some(Message::text(2, "b")), 0);

        let out = op.take_emitted();
        assert_eq!(out[0].metadata(WINDOW_SEQ), Some("0"));
        assert_eq!(out[1].metadata(WINDOW_SEQ), Some("1"));
    }
}
