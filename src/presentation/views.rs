use crate::application::{
    error::{ErrorReport, HttpError},
    gate::{GateStep, GateView},
};
use crate::domain::{entities::PostRecord, posts::PostSummary, posts::reading_minutes};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use super::format;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Sayfa oluşturulamadı",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(nav: NavView) -> Response {
    let view = LayoutContext::new("404", nav, ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Header navigation. The site title on the home page opens the authoring
/// dialog for anonymous visitors.
#[derive(Clone, Debug)]
pub struct NavView {
    pub home_active: bool,
    pub blog_active: bool,
    pub create_active: bool,
    pub is_authenticated: bool,
    pub title_href: &'static str,
}

impl NavView {
    pub fn for_path(path: &str, is_authenticated: bool) -> Self {
        let create_active = path == "/blog/create";
        let title_href = if path == "/" && !is_authenticated {
            "/auth"
        } else {
            "/"
        };
        Self {
            home_active: path == "/",
            blog_active: path.starts_with("/blog") && !create_active,
            create_active,
            is_authenticated,
            title_href,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToastView {
    pub kind: &'static str,
    pub message: String,
}

impl ToastView {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: "success",
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: "error",
            message: message.into(),
        }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub title: String,
    pub nav: NavView,
    pub toast: Option<ToastView>,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(title: impl Into<String>, nav: NavView, content: T) -> Self {
        Self {
            title: title.into(),
            nav,
            toast: None,
            content,
        }
    }

    pub fn with_toast(self, toast: Option<ToastView>) -> Self {
        Self { toast, ..self }
    }
}

pub struct HomeView {
    /// `None` when no home page content is stored.
    pub content_html: Option<String>,
    pub can_edit: bool,
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub view: LayoutContext<HomeView>,
}

#[derive(Clone, Debug)]
pub struct PostRowView {
    pub slug: String,
    pub title: String,
    pub date: String,
    pub iso_date: String,
    pub reading_time: String,
}

impl From<&PostSummary> for PostRowView {
    fn from(post: &PostSummary) -> Self {
        Self {
            slug: post.slug.clone(),
            title: post.title.clone(),
            date: format::list_date(post.created_at),
            iso_date: format::iso_date(post.created_at),
            reading_time: format::reading_time(post.reading_minutes),
        }
    }
}

pub struct BlogListView {
    pub posts: Vec<PostRowView>,
    /// The signed-in author's unpublished posts.
    pub drafts: Vec<PostRowView>,
}

#[derive(Template)]
#[template(path = "blog_list.html")]
pub struct BlogListTemplate {
    pub view: LayoutContext<BlogListView>,
}

pub struct PostView {
    pub slug: String,
    pub title: String,
    pub date: String,
    pub iso_date: String,
    pub reading_time: String,
    pub content_html: String,
    pub published: bool,
    pub can_edit: bool,
}

impl PostView {
    pub fn new(post: &PostRecord, content_html: String, can_edit: bool) -> Self {
        Self {
            slug: post.slug.clone(),
            title: post.title.clone(),
            date: format::long_date(post.created_at),
            iso_date: format::iso_date(post.created_at),
            reading_time: format::reading_time_long(reading_minutes(&post.content)),
            content_html,
            published: post.published,
            can_edit,
        }
    }
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub view: LayoutContext<PostView>,
}

/// Create and edit share one form; `action` is where it posts back.
pub struct PostFormView {
    pub heading: &'static str,
    pub action: String,
    pub submit_label: &'static str,
    pub cancel_href: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub published: bool,
    pub preview_html: Option<String>,
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormView>,
}

pub struct PostDeleteView {
    pub slug: String,
    pub title: String,
}

#[derive(Template)]
#[template(path = "post_delete.html")]
pub struct PostDeleteTemplate {
    pub view: LayoutContext<PostDeleteView>,
}

pub struct PageEditView {
    pub page_key: String,
    pub cancel_href: String,
    pub content: String,
    pub preview_html: Option<String>,
}

#[derive(Template)]
#[template(path = "page_edit.html")]
pub struct PageEditTemplate {
    pub view: LayoutContext<PageEditView>,
}

pub struct AuthDialogView {
    pub secret_step: bool,
    pub error: Option<String>,
    pub locked: bool,
    pub email: String,
}

impl AuthDialogView {
    pub fn from_gate(gate: GateView, email: impl Into<String>) -> Self {
        Self {
            secret_step: gate.step != GateStep::Credentials,
            error: gate.error,
            locked: gate.locked,
            email: email.into(),
        }
    }
}

#[derive(Template)]
#[template(path = "auth_dialog.html")]
pub struct AuthDialogTemplate {
    pub view: LayoutContext<AuthDialogView>,
}

#[derive(Template)]
#[template(path = "logout.html")]
pub struct LogoutTemplate {
    pub view: LayoutContext<()>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "404 - yanlış yola girdin!".to_string(),
            message: "aradığınız sayfa galiba başka diyarlara göç etti. belki yanlış bir linke tıkladınız ya da ben bir şeyleri eksik bıraktım 🙈".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}
