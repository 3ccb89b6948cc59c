//! Response cache configuration.

use std::{num::NonZeroUsize, time::Duration};

const DEFAULT_RESPONSE_LIMIT: usize = 200;
const DEFAULT_HOME_MAX_AGE_SECS: u64 = 3600;
const DEFAULT_BLOG_MAX_AGE_SECS: u64 = 600;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Maximum cached responses before LRU eviction.
    pub response_limit: usize,
    /// Freshness of `/`.
    pub home_max_age: Duration,
    /// Freshness of every other cached page.
    pub blog_max_age: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            response_limit: DEFAULT_RESPONSE_LIMIT,
            home_max_age: Duration::from_secs(DEFAULT_HOME_MAX_AGE_SECS),
            blog_max_age: Duration::from_secs(DEFAULT_BLOG_MAX_AGE_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            response_limit: settings.response_limit.get(),
            home_max_age: Duration::from_secs(settings.home_max_age_secs),
            blog_max_age: Duration::from_secs(settings.blog_max_age_secs),
        }
    }
}

impl CacheConfig {
    pub fn response_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.response_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn max_age_for(&self, path: &str) -> Duration {
        if path == "/" {
            self.home_max_age
        } else {
            self.blog_max_age
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_is_fresh_longer_than_blog_pages() {
        let config = CacheConfig::default();
        assert_eq!(config.max_age_for("/"), Duration::from_secs(3600));
        assert_eq!(config.max_age_for("/blog"), Duration::from_secs(600));
        assert_eq!(config.max_age_for("/blog/hello"), Duration::from_secs(600));
    }

    #[test]
    fn zero_limit_clamps_to_one() {
        let config = CacheConfig {
            response_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.response_limit_non_zero().get(), 1);
    }
}
