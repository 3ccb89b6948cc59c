//! Memoised markdown rendering.
//!
//! Entries are keyed by the exact source text and considered fresh for a
//! fixed TTL. Stale entries are replaced on the next read; there is no other
//! eviction, which keeps the map bounded only by the number of distinct
//! bodies the site serves.

use std::{collections::HashMap, sync::Arc, sync::RwLock};

use metrics::counter;
use time::{Duration, OffsetDateTime};
use tracing::{debug, error};

use crate::cache::lock::{rw_read, rw_write};
use crate::util::clock::Clock;

use super::parser::MarkdownParser;

const SOURCE: &str = "application::render::cache";

/// How long a rendered body stays fresh.
pub const DEFAULT_TTL: Duration = Duration::hours(1);

/// Fragment shown in place of content the parser rejected.
pub const FALLBACK_HTML: &str = "<p>İçerik işlenirken bir hata oluştu.</p>";

#[derive(Debug, Clone)]
struct CacheEntry {
    html: String,
    stored_at: OffsetDateTime,
}

pub struct MarkdownRenderer {
    parser: Arc<dyn MarkdownParser>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MarkdownRenderer {
    pub fn new(parser: Arc<dyn MarkdownParser>, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(parser, clock, DEFAULT_TTL)
    }

    pub fn with_ttl(parser: Arc<dyn MarkdownParser>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            parser,
            clock,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Render `source` to sanitised HTML, serving a fresh cached copy when one exists.
    ///
    /// Blank input yields an empty string and never touches the cache. Parser
    /// failures are logged and replaced by [`FALLBACK_HTML`]; they are not cached.
    pub fn render(&self, source: &str) -> String {
        if source.trim().is_empty() {
            return String::new();
        }

        let now = self.clock.now();
        if let Some(html) = self.fresh_entry(source, now) {
            counter!("kubinet_markdown_cache_hit_total").increment(1);
            return html;
        }
        counter!("kubinet_markdown_cache_miss_total").increment(1);

        match self.parser.parse(source) {
            Ok(html) => {
                debug!(
                    target = SOURCE,
                    source_len = source.len(),
                    "caching rendered markdown"
                );
                rw_write(&self.entries, SOURCE, "render.store").insert(
                    source.to_string(),
                    CacheEntry {
                        html: html.clone(),
                        stored_at: now,
                    },
                );
                html
            }
            Err(err) => {
                error!(
                    target = SOURCE,
                    error = %err,
                    source_len = source.len(),
                    "markdown rendering failed; serving fallback"
                );
                FALLBACK_HTML.to_string()
            }
        }
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When the entry for `source` was last stored, fresh or not.
    pub fn cached_at(&self, source: &str) -> Option<OffsetDateTime> {
        rw_read(&self.entries, SOURCE, "cached_at")
            .get(source)
            .map(|entry| entry.stored_at)
    }

    fn fresh_entry(&self, source: &str, now: OffsetDateTime) -> Option<String> {
        let entries = rw_read(&self.entries, SOURCE, "render.lookup");
        entries
            .get(source)
            .filter(|entry| now - entry.stored_at < self.ttl)
            .map(|entry| entry.html.clone())
    }
}
