//! `POST /api/revalidate`.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::application::{error::ErrorReport, revalidation::RevalidationError};

use super::AppState;

const SOURCE: &str = "infra::http::api::revalidate";

#[derive(Debug, Deserialize)]
struct RevalidateRequest {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

fn failure(status: StatusCode, message: &'static str, detail: String) -> Response {
    let mut response = (status, Json(json!({ "error": message }))).into_response();
    ErrorReport::from_message(SOURCE, status, detail).attach(&mut response);
    response
}

/// The body is read as raw bytes so malformed JSON maps to the same 500
/// payload as an invalidation failure.
pub(super) async fn revalidate(State(state): State<AppState>, body: Bytes) -> Response {
    let request: RevalidateRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!(target = SOURCE, error = %err, "unreadable revalidation body");
            return failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "İşlem başarısız",
                err.to_string(),
            );
        }
    };

    let token = request.token.as_deref().unwrap_or_default();
    match state
        .revalidation
        .revalidate(token, request.path.as_deref())
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(RevalidationError::Unauthorized) => failure(
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            "revalidation token mismatch".to_string(),
        ),
        Err(err) => {
            error!(target = SOURCE, error = %err, "revalidation failed");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "İşlem başarısız",
                err.to_string(),
            )
        }
    }
}
