#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, Response, StatusCode, header},
};
use kubinet::{
    application::{
        content::{BlogService, PageContentService, RevalidationHook},
        gate::LockoutPolicy,
        render::{ComrakParser, MarkdownRenderer},
        revalidation::RevalidationService,
    },
    cache::{CacheConfig, CacheState, ResponseStore},
    infra::{
        auth::LocalAuthBackend,
        http::{AppState, BrowserLimits, BrowserSessions, SESSION_COOKIE, build_router},
        memory::MemoryRepositories,
        revalidate::LocalRevalidator,
        storage::StorageBackend,
    },
    util::clock::SystemClock,
};
use tower::ServiceExt;

pub const SECRET_KEY: &str = "kubi-anahtar";
pub const REVALIDATE_TOKEN: &str = "yenile";
pub const EMAIL: &str = "ada@kubinet.dev";
pub const PASSWORD: &str = "parola";

pub struct TestSite {
    pub router: Router,
    pub repos: Arc<MemoryRepositories>,
    pub store: Arc<ResponseStore>,
}

pub fn site() -> TestSite {
    site_with(MemoryRepositories::new(), true)
}

pub fn site_with(repos: MemoryRepositories, cache_enabled: bool) -> TestSite {
    let repos = Arc::new(repos);
    let cache_config = CacheConfig {
        enabled: cache_enabled,
        ..CacheConfig::default()
    };
    let store = Arc::new(ResponseStore::new(&cache_config));
    let revalidation = Arc::new(RevalidationService::new(REVALIDATE_TOKEN, store.clone()));
    let hook = RevalidationHook::new(
        Arc::new(LocalRevalidator::new(revalidation.clone(), REVALIDATE_TOKEN)),
        Duration::from_secs(1),
    );
    let clock = Arc::new(SystemClock);
    let backend = LocalAuthBackend::new(EMAIL, &LocalAuthBackend::digest(PASSWORD));

    let state = AppState {
        blog: Arc::new(BlogService::new(repos.clone(), repos.clone(), hook.clone())),
        pages: Arc::new(PageContentService::new(repos.clone(), repos.clone(), hook)),
        renderer: Arc::new(MarkdownRenderer::new(
            Arc::new(ComrakParser::new()),
            clock.clone(),
        )),
        revalidation,
        sessions: Arc::new(BrowserSessions::new(
            Arc::new(backend),
            StorageBackend::Memory,
            SECRET_KEY,
            LockoutPolicy::default(),
            BrowserLimits::default(),
            clock,
        )),
        cache: cache_enabled.then(|| CacheState {
            config: cache_config,
            store: store.clone(),
        }),
        db: None,
    };

    TestSite {
        router: build_router(state),
        repos,
        store,
    }
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("request should build")
}

pub fn post_form(uri: &str, cookie: Option<&str>, fields: &[(&str, &str)]) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).expect("request should build")
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    String::from_utf8(bytes.to_vec()).expect("body should be utf-8")
}

pub fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
}

/// `name=value` of the first `Set-Cookie` header naming `name`.
pub fn set_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .find(|pair| pair.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

/// Walk the dialog to a signed-in session and return its cookie header.
pub async fn sign_in(router: &Router) -> String {
    let response = send(router, get("/auth", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = set_cookie(&response, SESSION_COOKIE).expect("session cookie issued");

    let response = send(
        router,
        post_form("/auth/secret", Some(&cookie), &[("secret", SECRET_KEY)]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        router,
        post_form(
            "/auth/login",
            Some(&cookie),
            &[("email", EMAIL), ("password", PASSWORD)],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/"));
    cookie
}
