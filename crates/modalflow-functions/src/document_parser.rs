//! Document parsing: format detection and plain-text extraction.
//!
//! HTML is stripped of scripts, styles, tags, and common entities;
//! Markdown and plain text are whitespace-normalised. A parse failure
//! forwards the original message instead of dropping it.

use std::collections::BTreeMap;

use modalflow_core::function::{FunctionResult, MapFunction};
use modalflow_core::message::{Content, FunctionResponse, Message};

/// Processing-step label stamped on parsed messages.
const STEP: &str = "document_parser";

/// Recognised document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    /// Detect from content.
    #[default]
    Auto,
    /// Plain text.
    PlainText,
    /// HTML markup.
    Html,
    /// Markdown markup.
    Markdown,
}

impl DocumentFormat {
    fn mime(self) -> &'static str {
        match self {
            Self::Auto => "unknown",
            Self::PlainText => "text/plain",
            Self::Html => "text/html",
            Self::Markdown => "text/markdown",
        }
    }
}

/// Parser configuration.
#[derive(Debug, Clone, Default)]
pub struct ParseConfig {
    /// Expected format; `Auto` detects per message.
    pub format: DocumentFormat,
    /// Record format, length, and title metadata on the output.
    pub extract_metadata: bool,
    /// Keep original whitespace instead of normalising it.
    pub preserve_structure: bool,
}

/// Map function extracting plain text from documents.
pub struct DocumentParserFunction {
    name: String,
    config: ParseConfig,
}

impl DocumentParserFunction {
    /// Creates a parser with the given configuration.
    #[must_use]
    pub fn new(config: ParseConfig) -> Self {
        Self::with_name("document_parser", config)
    }

    /// Same as [`DocumentParserFunction::new`] under an explicit name.
    #[must_use]
    pub fn with_name(name: impl Into<String>, config: ParseConfig) -> Self {
        Self { name: name.into(), config }
    }

    fn detect(content: &str) -> DocumentFormat {
        let head = content.trim_start();
        if head.starts_with("<!DOCTYPE") || content.contains("<html") || content.contains("</") {
            return DocumentFormat::Html;
        }
        if content.contains("# ") || content.contains("## ") || content.contains("**") {
            return DocumentFormat::Markdown;
        }
        DocumentFormat::PlainText
    }

    fn parse(&self, content: &str, format: DocumentFormat) -> String {
        match format {
            DocumentFormat::Html => self.normalise(&strip_html(content)),
            DocumentFormat::Auto | DocumentFormat::PlainText | DocumentFormat::Markdown => {
                self.normalise(content)
            }
        }
    }

    fn normalise(&self, text: &str) -> String {
        if self.config.preserve_structure {
            text.to_string()
        } else {
            text.split_whitespace().collect::<Vec<_>>().join(" ")
        }
    }

    fn metadata(content: &str, format: DocumentFormat) -> BTreeMap<String, String> {
        let mut meta = BTreeMap::new();
        meta.insert("doc.format".to_string(), format.mime().to_string());
        meta.insert("doc.length".to_string(), content.len().to_string());
        if format == DocumentFormat::Html {
            if let Some(title) = extract_between(content, "<title>", "</title>") {
                meta.insert("doc.title".to_string(), title.trim().to_string());
            }
        }
        meta
    }
}

impl MapFunction for DocumentParserFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, input: FunctionResponse) -> FunctionResult {
        let mut out = FunctionResponse::new();
        for mut msg in input {
            let Some(content) = msg.as_text().map(ToOwned::to_owned) else {
                // Only text documents are parsed.
                out.add(msg);
                continue;
            };
            if content.is_empty() {
                out.add(msg);
                continue;
            }

            let format = match self.config.format {
                DocumentFormat::Auto => Self::detect(&content),
                fixed => fixed,
            };
            let parsed = self.parse(&content, format);

            if self.config.extract_metadata {
                for (key, value) in Self::metadata(&content, format) {
                    msg.set_metadata(key, value);
                }
            }
            msg.set_content(Content::Text(parsed));
            msg.add_processing_step(STEP);
            out.add(msg);
        }
        Ok(out)
    }
}

/// Removes script/style blocks, tags, and common entities.
fn strip_html(html: &str) -> String {
    let without_scripts = remove_blocks(html, "<script", "</script>");
    let without_styles = remove_blocks(&without_scripts, "<style", "</style>");

    let mut text = String::with_capacity(without_styles.len());
    let mut in_tag = false;
    for c in without_styles.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
}

/// Removes every `open ... close` block, case-sensitively.
fn remove_blocks(input: &str, open: &str, close: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find(open) {
        result.push_str(&rest[..start]);
        match rest[start..].find(close) {
            Some(end) => rest = &rest[start + end + close.len()..],
            None => return result,
        }
    }
    result.push_str(rest);
    result
}

fn extract_between<'a>(input: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = input.find(open)? + open.len();
    let end = input[start..].find(close)?;
    Some(&input[start..start + end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(config: ParseConfig, text: &str) -> Message {
        let mut parser = DocumentParserFunction::new(config);
        parser
            .execute(FunctionResponse::from_message(Message::text(1, text)))
            .unwrap()
            .into_messages()
            .pop()
            .unwrap()
    }

    #[test]
    fn strips_html_to_text() {
        let msg = run(
            ParseConfig::default(),
            "<html><head><title>Doc</title><style>p{}</style></head> \
             <body><p>Hello &amp; welcome</p><script>alert(1)</script></body></html>",
        );
        assert_eq!(msg.as_text(), Some("Doc Hello & welcome"));
        assert_eq!(msg.processing_path(), &["document_parser".to_string()]);
    }

    #[test]
    fn detects_markdown_without_stripping() {
        let msg = run(ParseConfig::default(), "# Title\n\nSome  **bold** text");
        assert_eq!(msg.as_text(), Some("# Title Some **bold** text"));
    }

    #[test]
    fn extracts_metadata_when_asked() {
        let msg = run(
            ParseConfig { extract_metadata: true, ..Default::default() },
            "<html><title> My Page </title><body>content</body></html>",
        );
        assert_eq!(msg.metadata("doc.format"), Some("text/html"));
        assert_eq!(msg.metadata("doc.title"), Some("My Page"));
        assert!(msg.metadata("doc.length").is_some());
    }

    #[test]
    fn preserve_structure_keeps_whitespace() {
        let msg = run(
            ParseConfig { preserve_structure: true, format: DocumentFormat::PlainText, ..Default::default() },
            "line one\nline two",
        );
        assert_eq!(msg.as_text(), Some("line one\nline two"));
    }

    #[test]
    fn non_text_passes_through() {
        let mut parser = DocumentParserFunction::new(ParseConfig::default());
        let out = parser
            .execute(FunctionResponse::from_message(Message::binary(
                1,
                modalflow_core::ContentType::Binary,
                vec![0, 1],
            )))
            .unwrap();
        assert_eq!(out.len(), 1);
    }
}
