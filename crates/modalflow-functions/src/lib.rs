//! # modalflow functions
//!
//! Concrete functions for modalflow pipelines: in-memory sources and
//! sinks, text cleaning, document parsing, text embedding, and file /
//! vector-store sinks.
//!
//! Everything here plugs into the engine through the function traits of
//! `modalflow-core`; none of it is required by the engine itself.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod document_parser;
pub mod embedding;
pub mod file_sink;
pub mod memory;
pub mod text_cleaner;
pub mod vector_store;

pub use document_parser::{DocumentFormat, DocumentParserFunction, ParseConfig};
pub use embedding::{EmbeddingConfig, Pooling, TextEmbeddingFunction};
pub use file_sink::{FileFormat, FileSinkConfig, FileSinkFunction};
pub use memory::{CollectHandle, CollectSink, RangeSource, VecSource};
pub use text_cleaner::{TextCleanConfig, TextCleanError, TextCleanerFunction};
pub use vector_store::{VectorRecord, VectorStoreConfig, VectorStoreHandle, VectorStoreSinkFunction};
