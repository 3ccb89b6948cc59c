//! Authoring forms: create, edit and delete posts, edit page content.
//!
//! Every handler requires a signed-in viewer; anonymous requests are sent to
//! `/blog` with a toast. Failed writes re-render the form with the input kept.

use std::sync::Arc;

use axum::{
    Extension, Form,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::{error, warn};

use crate::{
    application::{content::ContentError, error::ErrorReport},
    domain::{
        entities::{PostRecord, page_path, post_path},
        error::DomainError,
        posts::{NewPost, PostPatch},
    },
    presentation::views::{
        LayoutContext, NavView, PageEditTemplate, PageEditView, PostDeleteTemplate,
        PostDeleteView, PostFormTemplate, PostFormView, ToastView, render_not_found_response,
        render_template_response,
    },
};

use super::{
    AppState, Browser, Viewer,
    flash::{self, Flash},
};

const SOURCE: &str = "infra::http::authoring";

const MISSING_FIELDS: &str = "Lütfen tüm alanları doldurun";
const BUSY: &str = "İşlem sürüyor, lütfen bekleyin";
const CREATE_FAILED: &str = "Gönderi oluşturulurken bir hata oluştu";
const UPDATE_FAILED: &str = "Gönderi güncellenirken bir hata oluştu";
const DELETE_FAILED: &str = "Gönderi silinirken bir hata oluştu";
const PAGE_SAVE_FAILED: &str = "İçerik kaydedilirken hata oluştu";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(super) enum Intent {
    Preview,
    #[default]
    Save,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PostForm {
    title: String,
    slug: String,
    content: String,
    /// Checkbox: present only when ticked.
    published: Option<String>,
    intent: Intent,
}

impl PostForm {
    fn is_published(&self) -> bool {
        self.published.is_some()
    }

    fn has_required_fields(&self) -> bool {
        !self.title.trim().is_empty() && !self.content.trim().is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PageForm {
    content: String,
    intent: Intent,
}

/// The signed-in viewer's browser and user id.
struct Author {
    browser: Arc<Browser>,
    user_id: String,
}

fn require_author(viewer: &Viewer) -> Option<Author> {
    if !viewer.is_authenticated() {
        return None;
    }
    Some(Author {
        browser: viewer.browser.clone()?,
        user_id: viewer.user_id()?.to_string(),
    })
}

fn sign_in_required(jar: CookieJar) -> Response {
    (flash::set(jar, Flash::SignInRequired), Redirect::to("/blog")).into_response()
}

fn with_report(mut response: Response, status: StatusCode, detail: &str) -> Response {
    ErrorReport::from_message(SOURCE, status, detail).attach(&mut response);
    response
}

struct PostFormPage {
    path: String,
    form: PostFormView,
}

impl PostFormPage {
    fn create(form: Option<&PostForm>) -> Self {
        Self {
            path: "/blog/create".to_string(),
            form: PostFormView {
                heading: "Yeni Gönderi",
                action: "/blog/create".to_string(),
                submit_label: "Gönderi Oluştur",
                cancel_href: "/blog".to_string(),
                title: form.map(|f| f.title.clone()).unwrap_or_default(),
                slug: form.map(|f| f.slug.clone()).unwrap_or_default(),
                content: form.map(|f| f.content.clone()).unwrap_or_default(),
                published: form.is_none_or(PostForm::is_published),
                preview_html: None,
            },
        }
    }

    fn edit(post: &PostRecord, form: Option<&PostForm>) -> Self {
        let path = format!("{}/edit", post_path(&post.slug));
        Self {
            form: PostFormView {
                heading: "Gönderiyi Düzenle",
                action: path.clone(),
                submit_label: "Kaydet",
                cancel_href: post_path(&post.slug),
                title: form.map_or_else(|| post.title.clone(), |f| f.title.clone()),
                slug: form.map_or_else(|| post.slug.clone(), |f| f.slug.clone()),
                content: form.map_or_else(|| post.content.clone(), |f| f.content.clone()),
                published: form.map_or(post.published, PostForm::is_published),
                preview_html: None,
            },
            path,
        }
    }

    fn with_preview(mut self, html: String) -> Self {
        self.form.preview_html = Some(html);
        self
    }

    fn render(self, toast: Option<ToastView>, status: StatusCode) -> Response {
        let title = self.form.heading;
        let view = LayoutContext::new(title, NavView::for_path(&self.path, true), self.form)
            .with_toast(toast);
        render_template_response(PostFormTemplate { view }, status)
    }

    fn render_error(self, message: &'static str, status: StatusCode) -> Response {
        with_report(
            self.render(Some(ToastView::error(message)), status),
            status,
            message,
        )
    }
}

pub(super) async fn create_form(
    Extension(viewer): Extension<Viewer>,
    jar: CookieJar,
) -> Response {
    if require_author(&viewer).is_none() {
        return sign_in_required(jar);
    }
    PostFormPage::create(None).render(None, StatusCode::OK)
}

pub(super) async fn create_submit(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    jar: CookieJar,
    Form(form): Form<PostForm>,
) -> Response {
    let Some(author) = require_author(&viewer) else {
        return sign_in_required(jar);
    };

    if form.intent == Intent::Preview {
        let html = state.renderer.render(&form.content);
        return PostFormPage::create(Some(&form))
            .with_preview(html)
            .render(None, StatusCode::OK);
    }
    if !form.has_required_fields() {
        return PostFormPage::create(Some(&form))
            .render_error(MISSING_FIELDS, StatusCode::UNPROCESSABLE_ENTITY);
    }
    let Some(_busy) = author.browser.try_begin() else {
        return PostFormPage::create(Some(&form)).render_error(BUSY, StatusCode::CONFLICT);
    };

    let new_post = NewPost {
        title: form.title.clone(),
        content: form.content.clone(),
        slug: form.slug.clone(),
        author_id: Some(author.user_id.clone()),
        published: form.is_published(),
    };
    match state.blog.create(new_post).await {
        Ok(post) => (
            flash::set(jar, Flash::PostCreated),
            Redirect::to(&post_path(&post.slug)),
        )
            .into_response(),
        Err(err) => {
            error!(target = SOURCE, user_id = %author.user_id, error = %err, "failed to create post");
            let (message, status) = write_failure(&err, CREATE_FAILED);
            PostFormPage::create(Some(&form)).render_error(message, status)
        }
    }
}

pub(super) async fn edit_form(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(slug): Path<String>,
    jar: CookieJar,
) -> Response {
    if require_author(&viewer).is_none() {
        return sign_in_required(jar);
    }
    match state.blog.get_by_slug(&slug).await {
        Some(post) => PostFormPage::edit(&post, None).render(None, StatusCode::OK),
        None => render_not_found_response(NavView::for_path(&post_path(&slug), true)),
    }
}

pub(super) async fn edit_submit(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(slug): Path<String>,
    jar: CookieJar,
    Form(form): Form<PostForm>,
) -> Response {
    let Some(author) = require_author(&viewer) else {
        return sign_in_required(jar);
    };
    let Some(post) = state.blog.get_by_slug(&slug).await else {
        return render_not_found_response(NavView::for_path(&post_path(&slug), true));
    };

    if form.intent == Intent::Preview {
        let html = state.renderer.render(&form.content);
        return PostFormPage::edit(&post, Some(&form))
            .with_preview(html)
            .render(None, StatusCode::OK);
    }
    if !form.has_required_fields() {
        return PostFormPage::edit(&post, Some(&form))
            .render_error(MISSING_FIELDS, StatusCode::UNPROCESSABLE_ENTITY);
    }
    let Some(_busy) = author.browser.try_begin() else {
        return PostFormPage::edit(&post, Some(&form)).render_error(BUSY, StatusCode::CONFLICT);
    };

    let patch = PostPatch {
        title: Some(form.title.clone()),
        content: Some(form.content.clone()),
        slug: (!form.slug.trim().is_empty()).then(|| form.slug.clone()),
        published: Some(form.is_published()),
    };
    match state.blog.update(post.id, patch).await {
        Ok(updated) => (
            flash::set(jar, Flash::PostUpdated),
            Redirect::to(&post_path(&updated.slug)),
        )
            .into_response(),
        Err(err) if err.is_not_found() => {
            render_not_found_response(NavView::for_path(&post_path(&slug), true))
        }
        Err(err) => {
            error!(target = SOURCE, post_id = %post.id, error = %err, "failed to update post");
            let (message, status) = write_failure(&err, UPDATE_FAILED);
            PostFormPage::edit(&post, Some(&form)).render_error(message, status)
        }
    }
}

fn render_delete(post: &PostRecord, toast: Option<ToastView>, status: StatusCode) -> Response {
    let path = format!("{}/delete", post_path(&post.slug));
    let view = LayoutContext::new(
        "gönderiyi sil",
        NavView::for_path(&path, true),
        PostDeleteView {
            slug: post.slug.clone(),
            title: post.title.clone(),
        },
    )
    .with_toast(toast);
    render_template_response(PostDeleteTemplate { view }, status)
}

pub(super) async fn delete_confirm(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(slug): Path<String>,
    jar: CookieJar,
) -> Response {
    if require_author(&viewer).is_none() {
        return sign_in_required(jar);
    }
    match state.blog.get_by_slug(&slug).await {
        Some(post) => render_delete(&post, None, StatusCode::OK),
        None => render_not_found_response(NavView::for_path(&post_path(&slug), true)),
    }
}

pub(super) async fn delete_submit(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(slug): Path<String>,
    jar: CookieJar,
) -> Response {
    let Some(author) = require_author(&viewer) else {
        return sign_in_required(jar);
    };
    let Some(post) = state.blog.get_by_slug(&slug).await else {
        return render_not_found_response(NavView::for_path(&post_path(&slug), true));
    };
    let Some(_busy) = author.browser.try_begin() else {
        return with_report(
            render_delete(&post, Some(ToastView::error(BUSY)), StatusCode::CONFLICT),
            StatusCode::CONFLICT,
            BUSY,
        );
    };

    if state.blog.delete(post.id).await {
        (flash::set(jar, Flash::PostDeleted), Redirect::to("/blog")).into_response()
    } else {
        with_report(
            render_delete(
                &post,
                Some(ToastView::error(DELETE_FAILED)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            StatusCode::INTERNAL_SERVER_ERROR,
            DELETE_FAILED,
        )
    }
}

fn render_page_form(
    page_key: &str,
    content: String,
    preview_html: Option<String>,
    toast: Option<ToastView>,
    status: StatusCode,
) -> Response {
    let path = format!("/pages/{page_key}/edit");
    let view = LayoutContext::new(
        "sayfayı düzenle",
        NavView::for_path(&path, true),
        PageEditView {
            page_key: page_key.to_string(),
            cancel_href: page_path(page_key),
            content,
            preview_html,
        },
    )
    .with_toast(toast);
    render_template_response(PageEditTemplate { view }, status)
}

pub(super) async fn page_form(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(page_key): Path<String>,
    jar: CookieJar,
) -> Response {
    if require_author(&viewer).is_none() {
        return sign_in_required(jar);
    }
    let content = state
        .pages
        .get(&page_key)
        .await
        .map(|page| page.content)
        .unwrap_or_default();
    render_page_form(&page_key, content, None, None, StatusCode::OK)
}

pub(super) async fn page_submit(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(page_key): Path<String>,
    jar: CookieJar,
    Form(form): Form<PageForm>,
) -> Response {
    let Some(author) = require_author(&viewer) else {
        return sign_in_required(jar);
    };

    if form.intent == Intent::Preview {
        let html = state.renderer.render(&form.content);
        return render_page_form(&page_key, form.content, Some(html), None, StatusCode::OK);
    }
    let Some(_busy) = author.browser.try_begin() else {
        let response = render_page_form(
            &page_key,
            form.content,
            None,
            Some(ToastView::error(BUSY)),
            StatusCode::CONFLICT,
        );
        return with_report(response, StatusCode::CONFLICT, BUSY);
    };

    match state
        .pages
        .update(&page_key, &form.content, Some(&author.user_id))
        .await
    {
        Ok(page) => (
            flash::set(jar, Flash::PageSaved),
            Redirect::to(&page.public_path()),
        )
            .into_response(),
        Err(err) => {
            warn!(target = SOURCE, page_key = %page_key, error = %err, "failed to save page content");
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            let response = render_page_form(
                &page_key,
                form.content,
                None,
                Some(ToastView::error(PAGE_SAVE_FAILED)),
                status,
            );
            with_report(response, status, PAGE_SAVE_FAILED)
        }
    }
}

fn write_failure(err: &ContentError, fallback: &'static str) -> (&'static str, StatusCode) {
    match err {
        ContentError::Domain(DomainError::Validation { .. }) => {
            (MISSING_FIELDS, StatusCode::UNPROCESSABLE_ENTITY)
        }
        _ => (fallback, StatusCode::INTERNAL_SERVER_ERROR),
    }
}
