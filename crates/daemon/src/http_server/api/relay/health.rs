use axum::response::IntoResponse;
use http::header::CONTENT_TYPE;
use http::StatusCode;

/// Plain liveness check. Never touches relay state.
pub async fn handler() -> impl IntoResponse {
    (StatusCode::OK, [(CONTENT_TYPE, "text/plain; charset=utf-8")], "ok")
}
