//! Vector store sink: batches embedding messages into a shared in-memory
//! collection.
//!
//! Records accumulate into batches of `batch_size` before being pushed to
//! the collection; `close` flushes the partial batch. Non-embedding
//! messages are skipped with a log line.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use modalflow_core::function::SinkFunction;
use modalflow_core::message::{FunctionResponse, Message};
use modalflow_core::FunctionError;

/// One stored embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// Originating message uid.
    pub uid: u64,
    /// The embedding vector.
    pub vector: Vec<f32>,
    /// Metadata carried by the message.
    pub metadata: BTreeMap<String, String>,
}

/// Vector store configuration.
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Collection name recorded for observability.
    pub collection: String,
    /// Records per insert batch.
    pub batch_size: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self { collection: "default".to_string(), batch_size: 50 }
    }
}

/// Shared handle to a stored collection.
#[derive(Clone, Default)]
pub struct VectorStoreHandle {
    records: Arc<Mutex<Vec<VectorRecord>>>,
}

impl VectorStoreHandle {
    /// Creates an empty collection handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored record count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Snapshot of the stored records.
    #[must_use]
    pub fn records(&self) -> Vec<VectorRecord> {
        self.records.lock().clone()
    }

    fn insert_batch(&self, batch: Vec<VectorRecord>) {
        self.records.lock().extend(batch);
    }
}

/// Sink function batching embeddings into a [`VectorStoreHandle`].
pub struct VectorStoreSinkFunction {
    name: String,
    config: VectorStoreConfig,
    store: VectorStoreHandle,
    batch: Vec<VectorRecord>,
}

impl VectorStoreSinkFunction {
    /// Creates a sink feeding the given collection.
    #[must_use]
    pub fn new(config: VectorStoreConfig, store: VectorStoreHandle) -> Self {
        Self { name: "vector_store_sink".to_string(), config, store, batch: Vec::new() }
    }

    /// Buffered (not yet inserted) record count.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.batch.len()
    }

    fn flush(&mut self) {
        if !self.batch.is_empty() {
            let batch = std::mem::take(&mut self.batch);
            tracing::debug!(
                collection = %self.config.collection,
                count = batch.len(),
                "inserting vector batch"
            );
            self.store.insert_batch(batch);
        }
    }
}

impl SinkFunction for VectorStoreSinkFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, input: FunctionResponse) -> Result<(), FunctionError> {
        for msg in input {
            let Some(vector) = msg.as_vector() else {
                tracing::debug!(uid = msg.uid(), "skipping non-embedding message");
                continue;
            };
            self.batch.push(VectorRecord {
                uid: msg.uid(),
                vector: vector.to_vec(),
                metadata: msg.metadata_entries().clone(),
            });
            if self.batch.len() >= self.config.batch_size.max(1) {
                self.flush();
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), FunctionError> {
        self.flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(uid: u64) -> Message {
        Message::vector(uid, vec![uid as f32, 1.0])
    }

    #[test]
    fn batches_until_the_threshold() {
        let store = VectorStoreHandle::new();
        let mut sink = VectorStoreSinkFunction::new(
            VectorStoreConfig { batch_size: 2, ..Default::default() },
            store.clone(),
        );

        sink.execute(FunctionResponse::from_message(embedding(1))).unwrap();
        assert_eq!(store.len(), 0);
        assert_eq!(sink.buffered(), 1);

        sink.execute(FunctionResponse::from_message(embedding(2))).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(sink.buffered(), 0);
    }

    #[test]
    fn close_flushes_the_partial_batch() {
        let store = VectorStoreHandle::new();
        let mut sink = VectorStoreSinkFunction::new(VectorStoreConfig::default(), store.clone());

        sink.execute(FunctionResponse::from_message(embedding(1))).unwrap();
        assert!(store.is_empty());
        sink.close().unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].uid, 1);
    }

    #[test]
    fn non_embedding_messages_are_skipped() {
        let store = VectorStoreHandle::new();
        let mut sink = VectorStoreSinkFunction::new(VectorStoreConfig::default(), store.clone());

        sink.execute(FunctionResponse::from_message(Message::text(1, "not a vector"))).unwrap();
        sink.close().unwrap();
        assert!(store.is_empty());
    }
}
