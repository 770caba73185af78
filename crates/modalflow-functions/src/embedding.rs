//! Text embedding: deterministic hashed-token vectors with pooling.
//!
//! Stands in for a model-backed embedder: each token hashes to a
//! reproducible pseudo-embedding, token vectors are pooled (mean or max),
//! and the result is optionally L2-normalised. The same text always
//! yields the same vector.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use modalflow_core::function::{FunctionResult, MapFunction};
use modalflow_core::message::{Content, FunctionResponse};
use modalflow_core::FunctionError;

/// Processing-step label stamped on embedded messages.
const STEP: &str = "text_embedding";

/// Pooling strategy over token embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pooling {
    /// Element-wise mean.
    #[default]
    Mean,
    /// Element-wise maximum.
    Max,
}

/// Embedding configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Model identifier recorded on output metadata.
    pub model_name: String,
    /// Output vector dimension.
    pub dimension: usize,
    /// Pooling strategy.
    pub pooling: Pooling,
    /// L2-normalise the pooled vector.
    pub normalize: bool,
    /// Token truncation bound.
    pub max_tokens: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: "hashed-tokens-v1".to_string(),
            dimension: 384,
            pooling: Pooling::Mean,
            normalize: true,
            max_tokens: 512,
        }
    }
}

/// Map function turning text messages into embedding messages.
///
/// The model must be loaded with [`TextEmbeddingFunction::init`] before
/// the pipeline runs; `execute` before `init` (or after `close`) is a
/// function error and the affected records are discarded by the hosting
/// operator.
pub struct TextEmbeddingFunction {
    name: String,
    config: EmbeddingConfig,
    initialized: bool,
}

impl TextEmbeddingFunction {
    /// Creates an embedder with the given configuration.
    #[must_use]
    pub fn new(config: EmbeddingConfig) -> Self {
        Self::with_name("text_embedding", config)
    }

    /// Same as [`TextEmbeddingFunction::new`] under an explicit name.
    #[must_use]
    pub fn with_name(name: impl Into<String>, config: EmbeddingConfig) -> Self {
        Self { name: name.into(), config, initialized: false }
    }

    /// Loads the model.
    pub fn init(&mut self) {
        self.initialized = true;
    }

    /// Releases the model.
    pub fn close(&mut self) {
        self.initialized = false;
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    /// Embeds one text, independent of message plumbing.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let tokens: Vec<&str> =
            text.split_whitespace().take(self.config.max_tokens).collect();
        if tokens.is_empty() {
            return vec![0.0; self.config.dimension];
        }

        let mut pooled = match self.config.pooling {
            Pooling::Mean => vec![0.0_f32; self.config.dimension],
            Pooling::Max => vec![f32::MIN; self.config.dimension],
        };
        for token in &tokens {
            for (i, slot) in pooled.iter_mut().enumerate() {
                let value = token_component(token, i);
                match self.config.pooling {
                    Pooling::Mean => *slot += value,
                    Pooling::Max => *slot = slot.max(value),
                }
            }
        }
        if self.config.pooling == Pooling::Mean {
            let count = tokens.len() as f32;
            for slot in &mut pooled {
                *slot /= count;
            }
        }

        if self.config.normalize {
            let norm = pooled.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > f32::EPSILON {
                for slot in &mut pooled {
                    *slot /= norm;
                }
            }
        }
        pooled
    }
}

/// Deterministic component in `[-1, 1]` for a token/dimension pair.
#[allow(clippy::cast_precision_loss)]
fn token_component(token: &str, index: usize) -> f32 {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    index.hash(&mut hasher);
    let raw = hasher.finish();
    ((raw as f64 / u64::MAX as f64) * 2.0 - 1.0) as f32
}

impl MapFunction for TextEmbeddingFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, input: FunctionResponse) -> FunctionResult {
        if !self.initialized {
            return Err(FunctionError::NotReady("embedding model not initialised".to_string()));
        }

        let mut out = FunctionResponse::new();
        for mut msg in input {
            let Some(text) = msg.as_text().map(ToOwned::to_owned) else {
                // Only text is embeddable; other modalities pass through.
                out.add(msg);
                continue;
            };
            if text.is_empty() {
                continue;
            }

            let vector = self.embed(&text);
            msg.set_content(Content::Vector(vector));
            msg.set_metadata("embedding.model", self.config.model_name.clone());
            msg.set_metadata("embedding.dimension", self.config.dimension.to_string());
            msg.add_processing_step(STEP);
            out.add(msg);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modalflow_core::message::Message;
    use modalflow_core::ContentType;

    fn embedder(config: EmbeddingConfig) -> TextEmbeddingFunction {
        let mut f = TextEmbeddingFunction::new(config);
        f.init();
        f
    }

    #[test]
    fn execute_before_init_is_not_ready() {
        let mut f = TextEmbeddingFunction::new(EmbeddingConfig::default());
        let result = f.execute(FunctionResponse::from_message(Message::text(1, "hi")));
        assert!(matches!(result, Err(FunctionError::NotReady(_))));
    }

    #[test]
    fn embedding_is_deterministic() {
        let f = embedder(EmbeddingConfig { dimension: 16, ..Default::default() });
        assert_eq!(f.embed("hello world"), f.embed("hello world"));
        assert_ne!(f.embed("hello world"), f.embed("goodbye world"));
    }

    #[test]
    fn normalised_vectors_have_unit_length() {
        let f = embedder(EmbeddingConfig { dimension: 32, ..Default::default() });
        let norm: f32 = f.embed("some text to embed").iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn output_message_carries_the_vector() {
        let mut f = embedder(EmbeddingConfig { dimension: 8, ..Default::default() });
        let out = f
            .execute(FunctionResponse::from_message(Message::text(3, "payload")))
            .unwrap();
        let msg = out.into_messages().pop().unwrap();
        assert_eq!(msg.uid(), 3);
        assert_eq!(msg.content_type(), ContentType::Embedding);
        assert_eq!(msg.as_vector().unwrap().len(), 8);
        assert_eq!(msg.metadata("embedding.dimension"), Some("8"));
    }

    #[test]
    fn max_pooling_differs_from_mean() {
        let mean = embedder(EmbeddingConfig { dimension: 8, pooling: Pooling::Mean, ..Default::default() });
        let max = embedder(EmbeddingConfig { dimension: 8, pooling: Pooling::Max, ..Default::default() });
        assert_ne!(mean.embed("a b c"), max.embed("a b c"));
    }
}
