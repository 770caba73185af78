//! In-memory sources and sinks for pipelines and tests.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use modalflow_core::function::{FunctionResult, SinkFunction, SourceFunction};
use modalflow_core::message::{FunctionResponse, Message, UidGenerator};
use modalflow_core::FunctionError;

/// Source that drains a prepared list of messages, one per invocation.
pub struct VecSource {
    name: String,
    items: VecDeque<Message>,
}

impl VecSource {
    /// Wraps the given messages.
    #[must_use]
    pub fn new(name: impl Into<String>, items: Vec<Message>) -> Self {
        Self { name: name.into(), items: items.into() }
    }
}

impl SourceFunction for VecSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self) -> FunctionResult {
        let mut out = FunctionResponse::new();
        if let Some(msg) = self.items.pop_front() {
            out.add(msg);
        }
        Ok(out)
    }

    fn has_next(&mut self) -> bool {
        !self.items.is_empty()
    }
}

/// Source generating `count` text messages with sequential uids.
pub struct RangeSource {
    name: String,
    uids: UidGenerator,
    remaining: u64,
}

impl RangeSource {
    /// Generates `count` messages with uids starting at zero.
    #[must_use]
    pub fn new(name: impl Into<String>, count: u64) -> Self {
        Self { name: name.into(), uids: UidGenerator::new(), remaining: count }
    }
}

impl SourceFunction for RangeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self) -> FunctionResult {
        let mut out = FunctionResponse::new();
        if self.remaining > 0 {
            self.remaining -= 1;
            let uid = self.uids.next_uid();
            out.add(Message::text(uid, format!("record-{uid}")));
        }
        Ok(out)
    }

    fn has_next(&mut self) -> bool {
        self.remaining > 0
    }
}

/// Shared view into the messages a [`CollectSink`] received.
#[derive(Clone, Default)]
pub struct CollectHandle {
    store: Arc<Mutex<Vec<Message>>>,
}

impl CollectHandle {
    /// Creates an empty handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages received so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    /// Whether nothing was received yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// Uids of the received messages, in arrival order.
    #[must_use]
    pub fn uids(&self) -> Vec<u64> {
        self.store.lock().iter().map(Message::uid).collect()
    }

    /// Text payloads of the received messages, in arrival order.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.store
            .lock()
            .iter()
            .map(|m| m.as_text().unwrap_or_default().to_string())
            .collect()
    }

    /// Takes all received messages, leaving the handle empty.
    #[must_use]
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.store.lock())
    }
}

/// Sink that appends every received message to a [`CollectHandle`].
pub struct CollectSink {
    name: String,
    handle: CollectHandle,
}

impl CollectSink {
    /// Creates a sink feeding the given handle.
    #[must_use]
    pub fn new(name: impl Into<String>, handle: CollectHandle) -> Self {
        Self { name: name.into(), handle }
    }
}

impl SinkFunction for CollectSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, input: FunctionResponse) -> Result<(), FunctionError> {
        let mut store = self.handle.store.lock();
        for msg in input {
            store.push(msg);
        }
        Ok(())
    }
}
