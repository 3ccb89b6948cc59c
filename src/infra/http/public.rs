use axum::{
    Extension,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::{
    domain::entities::HOMEPAGE_KEY,
    presentation::views::{
        BlogListTemplate, BlogListView, HomeTemplate, HomeView, LayoutContext, NavView,
        PostRowView, PostTemplate, PostView, render_not_found_response,
        render_template_response,
    },
};

use super::{AppState, Viewer, db_health_response, flash};

const SITE_CSS: &str = include_str!("../../../static/site.css");

pub(super) async fn home(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    jar: CookieJar,
) -> (CookieJar, Response) {
    let (jar, toast) = flash::take(jar);
    let content_html = state
        .pages
        .get(HOMEPAGE_KEY)
        .await
        .map(|page| state.renderer.render(&page.content));

    let view = LayoutContext::new(
        "ana sayfa",
        NavView::for_path("/", viewer.is_authenticated()),
        HomeView {
            content_html,
            can_edit: viewer.is_authenticated(),
        },
    )
    .with_toast(toast);
    (
        jar,
        render_template_response(HomeTemplate { view }, StatusCode::OK),
    )
}

pub(super) async fn blog_list(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    jar: CookieJar,
) -> (CookieJar, Response) {
    let (jar, toast) = flash::take(jar);
    let posts = state
        .blog
        .list_published()
        .await
        .iter()
        .map(PostRowView::from)
        .collect();
    let drafts = match viewer.user_id() {
        Some(user_id) => state
            .blog
            .list_for_author(user_id)
            .await
            .iter()
            .filter(|post| !post.published)
            .map(PostRowView::from)
            .collect(),
        None => Vec::new(),
    };

    let view = LayoutContext::new(
        "blog",
        NavView::for_path("/blog", viewer.is_authenticated()),
        BlogListView { posts, drafts },
    )
    .with_toast(toast);
    (
        jar,
        render_template_response(BlogListTemplate { view }, StatusCode::OK),
    )
}

pub(super) async fn post_detail(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(slug): Path<String>,
    jar: CookieJar,
) -> (CookieJar, Response) {
    let (jar, toast) = flash::take(jar);
    let nav = NavView::for_path(&format!("/blog/{slug}"), viewer.is_authenticated());

    // Drafts are visible to their author only.
    let post = state.blog.get_by_slug(&slug).await.filter(|post| {
        post.published
            || (viewer.is_authenticated() && post.author_id.as_deref() == viewer.user_id())
    });
    let Some(post) = post else {
        return (jar, render_not_found_response(nav));
    };

    let content_html = state.renderer.render(&post.content);
    let view = LayoutContext::new(
        post.title.clone(),
        nav,
        PostView::new(&post, content_html, viewer.is_authenticated()),
    )
    .with_toast(toast);
    (
        jar,
        render_template_response(PostTemplate { view }, StatusCode::OK),
    )
}

pub(super) async fn site_css() -> Response {
    let mut response = SITE_CSS.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/css; charset=utf-8"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=86400"),
    );
    response
}

pub(super) async fn health(State(state): State<AppState>) -> Response {
    match state.db.as_ref() {
        Some(db) => db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub(super) async fn not_found(Extension(viewer): Extension<Viewer>, uri: Uri) -> Response {
    render_not_found_response(NavView::for_path(uri.path(), viewer.is_authenticated()))
}
