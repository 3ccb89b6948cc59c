//! The authoring dialog: secret key, credentials, close and logout.

use std::sync::Arc;

use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::{error, info};

use crate::{
    application::{
        error::HttpError,
        gate::{GateStep, GateView, LimiterError},
    },
    presentation::views::{
        AuthDialogTemplate, AuthDialogView, LayoutContext, LogoutTemplate, NavView,
        render_template_response,
    },
};

use super::{AppState, Browser};

const SOURCE: &str = "infra::http::auth";

const BUSY: &str = "İşlem sürüyor, lütfen bekleyin";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct SecretForm {
    secret: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LoginForm {
    email: String,
    password: String,
}

fn storage_failure(err: LimiterError) -> Response {
    error!(target = SOURCE, error = %err, "client storage unavailable");
    HttpError::from_error(
        SOURCE,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Tarayıcı durumu okunamadı",
        &err,
    )
    .into_response()
}

fn render_dialog(jar: CookieJar, gate: GateView, email: &str) -> Response {
    let status = if gate.error.is_some() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    let view = LayoutContext::new(
        "giriş",
        NavView::for_path("/auth", false),
        AuthDialogView::from_gate(gate, email),
    );
    (jar, render_template_response(AuthDialogTemplate { view }, status)).into_response()
}

async fn browser(state: &AppState, jar: CookieJar) -> Result<(CookieJar, Arc<Browser>), Response> {
    state
        .sessions
        .find_or_create(jar)
        .await
        .map_err(storage_failure)
}

pub(super) async fn dialog(State(state): State<AppState>, jar: CookieJar) -> Response {
    let (jar, browser) = match browser(&state, jar).await {
        Ok(found) => found,
        Err(response) => return response,
    };
    if browser.viewer().is_authenticated {
        return (jar, Redirect::to("/")).into_response();
    }

    let view = browser.gate.lock().await.open().await;
    match view {
        Ok(view) => render_dialog(jar, view, ""),
        Err(err) => storage_failure(err),
    }
}

pub(super) async fn verify_secret(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<SecretForm>,
) -> Response {
    let (jar, browser) = match browser(&state, jar).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let view = browser.gate.lock().await.verify_secret(&form.secret).await;
    match view {
        Ok(view) => render_dialog(jar, view, ""),
        Err(err) => storage_failure(err),
    }
}

pub(super) async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let (jar, browser) = match browser(&state, jar).await {
        Ok(found) => found,
        Err(response) => return response,
    };
    let Some(_busy) = browser.try_begin() else {
        let view = GateView {
            step: browser.gate.lock().await.step(),
            error: Some(BUSY.to_string()),
            locked: false,
        };
        return render_dialog(jar, view, &form.email);
    };

    let view = browser
        .gate
        .lock()
        .await
        .login(&form.email, &form.password)
        .await;
    match view {
        Ok(view) if view.step == GateStep::Done => {
            let state = browser.settle_signed_in().await;
            info!(
                target = SOURCE,
                browser = %browser.id,
                authenticated = state.is_authenticated,
                "authoring session opened"
            );
            (jar, Redirect::to("/")).into_response()
        }
        Ok(view) => render_dialog(jar, view, &form.email),
        Err(err) => storage_failure(err),
    }
}

pub(super) async fn close(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(browser) = state.sessions.find(&jar) {
        browser.gate.lock().await.close();
    }
    (jar, Redirect::to("/")).into_response()
}

pub(super) async fn logout_confirm(State(state): State<AppState>, jar: CookieJar) -> Response {
    let signed_in = state
        .sessions
        .find(&jar)
        .is_some_and(|browser| browser.viewer().is_authenticated);
    if !signed_in {
        return Redirect::to("/").into_response();
    }
    let view = LayoutContext::new("çıkış", NavView::for_path("/auth/logout", true), ());
    render_template_response(LogoutTemplate { view }, StatusCode::OK)
}

pub(super) async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(browser) = state.sessions.find(&jar) {
        browser.gate.lock().await.logout().await;
        browser.settle_signed_out().await;
        info!(target = SOURCE, browser = %browser.id, "authoring session closed");
    }
    (jar, Redirect::to("/")).into_response()
}
