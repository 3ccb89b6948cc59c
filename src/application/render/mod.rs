//! Markdown rendering: comrak parsing, ammonia sanitising and a TTL memo.

mod cache;
mod config;
mod parser;

pub use cache::{DEFAULT_TTL, FALLBACK_HTML, MarkdownRenderer};
pub use parser::{ComrakParser, MarkdownParser, RenderError};
