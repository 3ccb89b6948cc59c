//! Response cache middleware.
//!
//! Caches successful GET responses for anonymous visitors and serves them
//! until they expire or their path is revalidated.

use std::{sync::Arc, time::Instant};

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, instrument};

use super::{
    CacheConfig,
    store::{CachedResponse, ResponseKey, ResponseStore},
};

const MAX_CACHED_BODY: usize = 1024 * 1024;

/// Request extension marking a request that must neither read nor fill the
/// cache, e.g. one from a signed-in author.
#[derive(Debug, Clone, Copy)]
pub struct BypassCache;

#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub store: Arc<ResponseStore>,
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enabled
        || request.method() != Method::GET
        || request.extensions().get::<BypassCache>().is_some()
    {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let key = ResponseKey::new(path.clone(), request.uri().query());

    if let Some(cached) = cache.store.get(&key) {
        counter!("kubinet_response_cache_hit_total").increment(1);
        debug!(cache = "response", outcome = "hit", "serving cached response");
        return build_response(cached);
    }
    counter!("kubinet_response_cache_miss_total").increment(1);
    debug!(cache = "response", outcome = "miss", "cache miss, executing handler");

    let mut response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    // Only bodies of known size within the limit are buffered; anything else
    // goes out untouched and uncached.
    let body_len = response.body().size_hint().upper();
    if body_len.is_none_or(|len| len > MAX_CACHED_BODY as u64) {
        debug!(
            cache = "response",
            outcome = "skip",
            body_len = ?body_len,
            "response body too large to cache"
        );
        return response;
    }

    let max_age = cache.config.max_age_for(&path);
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", max_age.as_secs())) {
        response.headers_mut().insert(header::CACHE_CONTROL, value);
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    cache.store.set(
        key,
        CachedResponse {
            status: parts.status.as_u16(),
            headers: parts
                .headers
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
                .collect(),
            body: bytes.clone(),
            stored_at: Instant::now(),
            max_age,
        },
    );

    Response::from_parts(parts, Body::from(bytes))
}

fn build_response(cached: CachedResponse) -> Response {
    let mut builder = Response::builder().status(cached.status);
    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }
    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{Router, middleware, routing::get};
    use tower::ServiceExt;

    use super::*;

    fn app(hits: Arc<AtomicUsize>, store: Arc<ResponseStore>) -> Router {
        let state = CacheState {
            config: CacheConfig::default(),
            store,
        };
        Router::new()
            .route(
                "/",
                get(move || {
                    let hits = hits.clone();
                    async move { format!("render #{}", hits.fetch_add(1, Ordering::SeqCst) + 1) }
                }),
            )
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .layer(middleware::from_fn_with_state(state, response_cache_layer))
    }

    async fn body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn second_get_is_served_from_cache() {
        let hits = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(ResponseStore::new(&CacheConfig::default()));
        let app = app(hits.clone(), store.clone());

        let first = app.clone().oneshot(get_request("/")).await.expect("first");
        assert_eq!(
            first.headers().get(header::CACHE_CONTROL).expect("header"),
            "public, max-age=3600"
        );
        assert_eq!(body(first).await, "render #1");

        let second = app.clone().oneshot(get_request("/")).await.expect("second");
        assert_eq!(body(second).await, "render #1");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        store.invalidate("/");
        let third = app.oneshot(get_request("/")).await.expect("third");
        assert_eq!(body(third).await, "render #2");
    }

    #[tokio::test]
    async fn bypass_marker_skips_the_cache() {
        let hits = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(ResponseStore::new(&CacheConfig::default()));
        let app = app(hits.clone(), store.clone());

        let mut request = get_request("/");
        request.extensions_mut().insert(BypassCache);
        app.oneshot(request).await.expect("response");

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn oversized_body_passes_through_uncached() {
        let store = Arc::new(ResponseStore::new(&CacheConfig::default()));
        let state = CacheState {
            config: CacheConfig::default(),
            store: store.clone(),
        };
        let app = Router::new()
            .route("/blog/uzun", get(|| async { "a".repeat(MAX_CACHED_BODY + 1) }))
            .layer(middleware::from_fn_with_state(state, response_cache_layer));

        let response = app
            .oneshot(get_request("/blog/uzun"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CACHE_CONTROL).is_none());
        assert_eq!(body(response).await.len(), MAX_CACHED_BODY + 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let store = Arc::new(ResponseStore::new(&CacheConfig::default()));
        let app = app(Arc::new(AtomicUsize::new(0)), store.clone());

        let response = app.oneshot(get_request("/missing")).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(store.is_empty());
    }
}
