//! HTTP surface: public pages, authoring forms, the auth dialog and the
//! revalidation endpoint, all on one router.

mod api;
mod auth;
mod authoring;
mod flash;
mod middleware;
mod public;
mod sessions;

pub use sessions::{Browser, BrowserLimits, BrowserSessions, SESSION_COOKIE, Viewer};

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use sqlx::Error as SqlxError;

use crate::{
    application::{
        content::{BlogService, PageContentService},
        error::ErrorReport,
        render::MarkdownRenderer,
        revalidation::RevalidationService,
    },
    cache::{CacheState, response_cache_layer},
    infra::db::PostgresRepositories,
};

use middleware::{log_responses, set_request_context};
use sessions::attach_viewer;

#[derive(Clone)]
pub struct AppState {
    pub blog: Arc<BlogService>,
    pub pages: Arc<PageContentService>,
    pub renderer: Arc<MarkdownRenderer>,
    pub revalidation: Arc<RevalidationService>,
    pub sessions: Arc<BrowserSessions>,
    pub cache: Option<CacheState>,
    /// `None` when running on in-memory repositories.
    pub db: Option<Arc<PostgresRepositories>>,
}

pub fn build_router(state: AppState) -> Router {
    let cached_routes = Router::new()
        .route("/", get(public::home))
        .route("/blog", get(public::blog_list))
        .route("/blog/{slug}", get(public::post_detail));

    let cached_routes = if let Some(cache_state) = state.cache.clone() {
        cached_routes.layer(from_fn_with_state(cache_state, response_cache_layer))
    } else {
        cached_routes
    };

    let dynamic_routes = Router::new()
        .route(
            "/blog/create",
            get(authoring::create_form).post(authoring::create_submit),
        )
        .route(
            "/blog/{slug}/edit",
            get(authoring::edit_form).post(authoring::edit_submit),
        )
        .route(
            "/blog/{slug}/delete",
            get(authoring::delete_confirm).post(authoring::delete_submit),
        )
        .route(
            "/pages/{page_key}/edit",
            get(authoring::page_form).post(authoring::page_submit),
        )
        .route("/auth", get(auth::dialog))
        .route("/auth/secret", post(auth::verify_secret))
        .route("/auth/login", post(auth::login))
        .route("/auth/close", post(auth::close))
        .route("/auth/logout", get(auth::logout_confirm).post(auth::logout))
        .route("/api/revalidate", post(api::revalidate))
        .route("/static/site.css", get(public::site_css))
        .route("/_health", get(public::health));

    let sessions = state.sessions.clone();

    cached_routes
        .merge(dynamic_routes)
        .fallback(public::not_found)
        .with_state(state)
        .layer(from_fn(log_responses))
        .layer(from_fn_with_state(sessions, attach_viewer))
        .layer(from_fn(set_request_context))
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
