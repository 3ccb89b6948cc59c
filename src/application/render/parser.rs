use comrak::{Arena, format_html, parse_document};
use thiserror::Error;

use super::config::{build_sanitizer, default_options};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("markdown parsing failed: {message}")]
    Markdown { message: String },
}

/// Markdown to HTML conversion. Implementations must be deterministic.
pub trait MarkdownParser: Send + Sync {
    fn parse(&self, source: &str) -> Result<String, RenderError>;
}

/// Comrak-based parser with Ammonia sanitisation of the produced HTML.
pub struct ComrakParser {
    options: comrak::Options<'static>,
    sanitizer: ammonia::Builder<'static>,
}

impl ComrakParser {
    pub fn new() -> Self {
        Self {
            options: default_options(),
            sanitizer: build_sanitizer(),
        }
    }
}

impl Default for ComrakParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownParser for ComrakParser {
    fn parse(&self, source: &str) -> Result<String, RenderError> {
        let arena = Arena::new();
        let root = parse_document(&arena, source, &self.options);

        let mut html = String::new();
        format_html(root, &self.options, &mut html).map_err(|err| RenderError::Markdown {
            message: err.to_string(),
        })?;

        Ok(self.sanitizer.clean(&html).to_string())
    }
}
