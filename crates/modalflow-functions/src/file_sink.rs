//! File sink: writes messages as plain text, JSON lines, or CSV.
//!
//! `init` opens the file (truncate or append) and writes the optional
//! header; `close` flushes and releases it. Writes are buffered and
//! flushed every `flush_every` messages.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::Serialize;

use modalflow_core::function::SinkFunction;
use modalflow_core::message::{Content, FunctionResponse, Message};
use modalflow_core::FunctionError;

/// Output record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// One line of text content per message; non-text messages are
    /// skipped.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
    /// `uid,type,timestamp,content` rows.
    Csv,
}

/// File sink configuration.
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Record layout.
    pub format: FileFormat,
    /// Append instead of truncating.
    pub append: bool,
    /// Optional first line written at `init`.
    pub header: Option<String>,
    /// Flush after this many messages.
    pub flush_every: usize,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self { format: FileFormat::Text, append: false, header: None, flush_every: 100 }
    }
}

/// JSON-line payload for [`FileFormat::Json`].
#[derive(Serialize)]
struct JsonRecord<'a> {
    uid: u64,
    #[serde(rename = "type")]
    content_type: String,
    timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    binary_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vector_dimension: Option<usize>,
}

/// Sink function writing messages to one file.
pub struct FileSinkFunction {
    name: String,
    path: PathBuf,
    config: FileSinkConfig,
    writer: Option<BufWriter<File>>,
    written: usize,
}

impl FileSinkFunction {
    /// Creates a file sink for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, config: FileSinkConfig) -> Self {
        Self {
            name: "file_sink".to_string(),
            path: path.into(),
            config,
            writer: None,
            written: 0,
        }
    }

    /// Messages written since `init`.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    fn write_message(&mut self, msg: &Message) -> Result<(), FunctionError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(FunctionError::NotReady("file sink not opened".to_string()));
        };

        match self.config.format {
            FileFormat::Text => {
                if let Some(text) = msg.as_text() {
                    writeln!(writer, "{text}")?;
                }
            }
            FileFormat::Json => {
                let record = JsonRecord {
                    uid: msg.uid(),
                    content_type: msg.content_type().to_string(),
                    timestamp: msg.timestamp(),
                    content: msg.as_text(),
                    binary_size: msg.as_bytes().map(<[u8]>::len),
                    vector_dimension: msg.as_vector().map(<[f32]>::len),
                };
                let line = serde_json::to_string(&record)
                    .map_err(|err| FunctionError::Record(err.to_string()))?;
                writeln!(writer, "{line}")?;
            }
            FileFormat::Csv => {
                let content = match msg.content() {
                    Content::Text(text) => format!("\"{}\"", text.replace('"', "\"\"")),
                    Content::Bytes(_) => "\"[binary]\"".to_string(),
                    Content::Vector(_) => "\"[vector]\"".to_string(),
                };
                writeln!(
                    writer,
                    "{},{},{},{}",
                    msg.uid(),
                    msg.content_type(),
                    msg.timestamp(),
                    content
                )?;
            }
        }

        self.written += 1;
        if self.config.flush_every > 0 && self.written % self.config.flush_every == 0 {
            writer.flush()?;
        }
        Ok(())
    }
}

impl SinkFunction for FileSinkFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) -> Result<(), FunctionError> {
        let file = if self.config.append {
            OpenOptions::new().create(true).append(true).open(&self.path)?
        } else {
            File::create(&self.path)?
        };
        let mut writer = BufWriter::new(file);
        if let Some(header) = &self.config.header {
            writeln!(writer, "{header}")?;
        }
        self.writer = Some(writer);
        self.written = 0;
        Ok(())
    }

    fn execute(&mut self, input: FunctionResponse) -> Result<(), FunctionError> {
        for msg in input {
            self.write_message(&msg)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), FunctionError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}
