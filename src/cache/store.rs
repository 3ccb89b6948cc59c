//! LRU store of rendered responses keyed by path and query.

use std::{
    sync::RwLock,
    time::{Duration, Instant},
};

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tracing::debug;

use crate::application::revalidation::{InvalidateError, PathInvalidator};

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseKey {
    pub path: String,
    pub query: String,
}

impl ResponseKey {
    pub fn new(path: impl Into<String>, query: Option<&str>) -> Self {
        Self {
            path: path.into(),
            query: query.unwrap_or_default().to_string(),
        }
    }
}

#[derive(Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub stored_at: Instant,
    pub max_age: Duration,
}

impl CachedResponse {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.max_age
    }
}

pub struct ResponseStore {
    responses: RwLock<LruCache<ResponseKey, CachedResponse>>,
}

impl ResponseStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            responses: RwLock::new(LruCache::new(config.response_limit_non_zero())),
        }
    }

    /// Fresh entry for `key`; stale entries are dropped on the way.
    pub fn get(&self, key: &ResponseKey) -> Option<CachedResponse> {
        let mut responses = rw_write(&self.responses, SOURCE, "get");
        match responses.get(key) {
            Some(entry) if entry.is_fresh(Instant::now()) => Some(entry.clone()),
            Some(_) => {
                responses.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: ResponseKey, response: CachedResponse) {
        let evicted = rw_write(&self.responses, SOURCE, "set").push(key.clone(), response);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!("kubinet_response_cache_evict_total").increment(1);
        }
    }

    /// Remove every cached variant of `path`, whatever its query string.
    pub fn invalidate(&self, path: &str) -> usize {
        let mut responses = rw_write(&self.responses, SOURCE, "invalidate");
        let matching: Vec<ResponseKey> = responses
            .iter()
            .filter(|(key, _)| key.path == path)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &matching {
            responses.pop(key);
        }
        matching.len()
    }

    pub fn clear(&self) {
        rw_write(&self.responses, SOURCE, "clear").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.responses, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PathInvalidator for ResponseStore {
    fn invalidate_path(&self, path: &str) -> Result<usize, InvalidateError> {
        if !path.starts_with('/') {
            return Err(InvalidateError::InvalidPath {
                path: path.to_string(),
            });
        }
        let evicted = self.invalidate(path);
        debug!(target = SOURCE, path, evicted, "invalidated cached responses");
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &'static str, max_age: Duration) -> CachedResponse {
        CachedResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: Bytes::from(body),
            stored_at: Instant::now(),
            max_age,
        }
    }

    #[test]
    fn stored_response_is_served_until_invalidated() {
        let store = ResponseStore::new(&CacheConfig::default());
        let key = ResponseKey::new("/blog", None);
        store.set(key.clone(), response("list", Duration::from_secs(60)));

        let cached = store.get(&key).expect("cached");
        assert_eq!(cached.body, Bytes::from("list"));

        assert_eq!(store.invalidate_path("/blog").expect("invalidate"), 1);
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn invalidation_covers_every_query_variant() {
        let store = ResponseStore::new(&CacheConfig::default());
        store.set(ResponseKey::new("/blog", None), response("a", Duration::from_secs(60)));
        store.set(
            ResponseKey::new("/blog", Some("page=2")),
            response("b", Duration::from_secs(60)),
        );
        store.set(ResponseKey::new("/", None), response("c", Duration::from_secs(60)));

        assert_eq!(store.invalidate("/blog"), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let store = ResponseStore::new(&CacheConfig::default());
        let key = ResponseKey::new("/", None);
        store.set(key.clone(), response("home", Duration::ZERO));

        assert!(store.get(&key).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn relative_paths_are_rejected() {
        let store = ResponseStore::new(&CacheConfig::default());
        let err = store.invalidate_path("blog").expect_err("relative");
        assert!(matches!(err, InvalidateError::InvalidPath { .. }));
    }

    #[test]
    fn capacity_evicts_least_recent() {
        let store = ResponseStore::new(&CacheConfig {
            response_limit: 1,
            ..Default::default()
        });
        store.set(ResponseKey::new("/", None), response("a", Duration::from_secs(60)));
        store.set(ResponseKey::new("/blog", None), response("b", Duration::from_secs(60)));

        assert!(store.get(&ResponseKey::new("/", None)).is_none());
        assert!(store.get(&ResponseKey::new("/blog", None)).is_some());
    }
}
