//! In-process response cache for public pages.
//!
//! Anonymous GET responses are stored per path and query with a per-path
//! max age (`/` for an hour, everything else ten minutes). Revalidation
//! evicts a path through [`ResponseStore`]'s `PathInvalidator` impl.

mod config;
pub(crate) mod lock;
mod middleware;
mod store;

pub use config::CacheConfig;
pub use middleware::{BypassCache, CacheState, response_cache_layer};
pub use store::{CachedResponse, ResponseKey, ResponseStore};
