//! Text cleaning: pattern removal, whitespace normalisation, and quality
//! scoring.
//!
//! Each text message is scrubbed according to the configuration, scored
//! in `[0, 1]`, and dropped when it scores below the configured floor.
//! Non-text messages pass through untouched.

use regex::Regex;

use modalflow_core::function::{FunctionResult, MapFunction};
use modalflow_core::message::{Content, FunctionResponse, Message};

/// Processing-step label stamped on cleaned messages.
const STEP: &str = "text_cleaner";

/// Configuration for text cleaning and quality assessment.
#[derive(Debug, Clone)]
pub struct TextCleanConfig {
    /// Regex patterns whose matches are replaced.
    pub patterns: Vec<String>,
    /// Replacement for matched patterns.
    pub replacement: String,
    /// Collapse whitespace runs into single spaces and trim.
    pub remove_extra_whitespace: bool,
    /// Lowercase the text.
    pub to_lowercase: bool,
    /// Strip ASCII punctuation.
    pub remove_punctuation: bool,
    /// Length below which the length score degrades.
    pub min_length: usize,
    /// Length above which the length score degrades.
    pub max_length: usize,
    /// Messages scoring below this are dropped.
    pub min_quality_score: f32,
}

impl Default for TextCleanConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            replacement: String::new(),
            remove_extra_whitespace: true,
            to_lowercase: false,
            remove_punctuation: false,
            min_length: 10,
            max_length: 10_000,
            min_quality_score: 0.3,
        }
    }
}

/// Configuration failure while building a cleaner.
#[derive(Debug, thiserror::Error)]
pub enum TextCleanError {
    /// A removal pattern did not compile.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// The regex compile failure.
        source: regex::Error,
    },
}

/// Map function that cleans and scores text content.
pub struct TextCleanerFunction {
    name: String,
    config: TextCleanConfig,
    compiled: Vec<Regex>,
}

impl TextCleanerFunction {
    /// Builds a cleaner, compiling all removal patterns up front.
    ///
    /// # Errors
    ///
    /// Returns [`TextCleanError::InvalidPattern`] for an uncompilable
    /// pattern.
    pub fn new(config: TextCleanConfig) -> Result<Self, TextCleanError> {
        Self::with_name("text_cleaner", config)
    }

    /// Same as [`TextCleanerFunction::new`] under an explicit name.
    ///
    /// # Errors
    ///
    /// Returns [`TextCleanError::InvalidPattern`] for an uncompilable
    /// pattern.
    pub fn with_name(
        name: impl Into<String>,
        config: TextCleanConfig,
    ) -> Result<Self, TextCleanError> {
        let compiled = config
            .patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| TextCleanError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { name: name.into(), config, compiled })
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &TextCleanConfig {
        &self.config
    }

    fn clean(&self, input: &str) -> String {
        let mut text = input.to_string();
        for regex in &self.compiled {
            text = regex.replace_all(&text, self.config.replacement.as_str()).into_owned();
        }
        if self.config.remove_punctuation {
            text.retain(|c| !c.is_ascii_punctuation());
        }
        if self.config.to_lowercase {
            text = text.to_lowercase();
        }
        if self.config.remove_extra_whitespace {
            text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        }
        text
    }

    /// Quality in `[0, 1]`: a base of character diversity and alphabetic
    /// ratio, scaled by how well the length fits the configured band, so
    /// fragments score low no matter how clean they are.
    #[allow(clippy::cast_precision_loss)]
    fn score(&self, text: &str) -> f32 {
        if text.is_empty() {
            return 0.0;
        }
        let len = text.chars().count();

        let length = if len < self.config.min_length {
            len as f32 / self.config.min_length.max(1) as f32
        } else if len > self.config.max_length {
            self.config.max_length as f32 / len as f32
        } else {
            1.0
        };

        let unique = {
            let mut chars: Vec<char> = text.chars().collect();
            chars.sort_unstable();
            chars.dedup();
            chars.len()
        };
        let diversity = (unique as f32 / 32.0).min(1.0);

        let alphabetic = text.chars().filter(|c| c.is_alphabetic() || c.is_whitespace()).count();
        let alpha_ratio = alphabetic as f32 / len as f32;

        (length * (0.4 + 0.3 * diversity + 0.3 * alpha_ratio)).clamp(0.0, 1.0)
    }
}

impl MapFunction for TextCleanerFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, input: FunctionResponse) -> FunctionResult {
        let mut out = FunctionResponse::new();
        for mut msg in input {
            let Some(text) = msg.as_text() else {
                out.add(msg);
                continue;
            };

            let cleaned = self.clean(text);
            let score = self.score(&cleaned);
            if score < self.config.min_quality_score {
                tracing::debug!(uid = msg.uid(), score, "message dropped below quality floor");
                continue;
            }

            msg.set_content(Content::Text(cleaned));
            msg.set_quality_score(score);
            msg.add_processing_step(STEP);
            out.add(msg);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner(config: TextCleanConfig) -> TextCleanerFunction {
        TextCleanerFunction::new(config).unwrap()
    }

    fn run(cleaner: &mut TextCleanerFunction, text: &str) -> Option<Message> {
        let out = cleaner
            .execute(FunctionResponse::from_message(Message::text(1, text)))
            .unwrap();
        out.into_messages().pop()
    }

    #[test]
    fn normalises_whitespace() {
        let mut f = cleaner(TextCleanConfig { min_quality_score: 0.0, ..Default::default() });
        let msg = run(&mut f, "  hello   streaming\t\tworld  ").unwrap();
        assert_eq!(msg.as_text(), Some("hello streaming world"));
        assert!(msg.quality_score().is_some());
        assert_eq!(msg.processing_path(), &["text_cleaner".to_string()]);
    }

    #[test]
    fn removes_configured_patterns() {
        let mut f = cleaner(TextCleanConfig {
            patterns: vec![r"https?://\S+".to_string()],
            min_quality_score: 0.0,
            ..Default::default()
        });
        let msg = run(&mut f, "see https://example.com for details").unwrap();
        assert_eq!(msg.as_text(), Some("see for details"));
    }

    #[test]
    fn lowercase_and_punctuation() {
        let mut f = cleaner(TextCleanConfig {
            to_lowercase: true,
            remove_punctuation: true,
            min_quality_score: 0.0,
            ..Default::default()
        });
        let msg = run(&mut f, "Hello, World!").unwrap();
        assert_eq!(msg.as_text(), Some("hello world"));
    }

    #[test]
    fn drops_below_quality_floor() {
        let mut f = cleaner(TextCleanConfig { min_quality_score: 0.9, ..Default::default() });
        assert!(run(&mut f, "x").is_none());
    }

    #[test]
    fn non_text_passes_through() {
        let mut f = cleaner(TextCleanConfig::default());
        let input = FunctionResponse::from_message(Message::vector(5, vec![1.0]));
        let out = f.execute(input).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let result = TextCleanerFunction::new(TextCleanConfig {
            patterns: vec!["([unclosed".to_string()],
            ..Default::default()
        });
        assert!(matches!(result, Err(TextCleanError::InvalidPattern { .. })));
    }
}
