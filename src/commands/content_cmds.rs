//! Public content routes.
//!
//! - GET/HEAD /content/:slug         307 to the entry document
//! - GET/HEAD /content/:slug/*path   the file itself, streamed
//!
//! End users only ever see "content unavailable"; the reason is logged.

use super::AppState;
use crate::services::gateway::ServedFile;
use crate::types::errors::ContentError;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use tokio_util::io::ReaderStream;

const STREAM_CHUNK: usize = 64 * 1024;
const UNAVAILABLE: &str = "content unavailable";

pub fn content_router() -> Router<AppState> {
    Router::new()
        .route("/content/:slug", get(entry_redirect))
        .route("/content/:slug/*path", get(serve_content))
}

async fn entry_redirect(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Response {
    let user = user_id(&state, &headers);
    match state.gateway.entry_redirect(&slug, user.as_deref()).await {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(e) => content_error_response(&slug, "", e),
    }
}

async fn serve_content(
    State(state): State<AppState>,
    Path((slug, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let user = user_id(&state, &headers);
    match state.gateway.resolve(&slug, &path, user.as_deref()).await {
        Ok(served) => stream_file(served, state.config.production).await,
        Err(e) => content_error_response(&slug, &path, e),
    }
}

fn user_id(state: &AppState, headers: &HeaderMap) -> Option<String> {
    headers
        .get(state.config.user_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

async fn stream_file(served: ServedFile, production: bool) -> Response {
    let file = match tokio::fs::File::open(&served.path).await {
        Ok(file) => file,
        Err(e) => {
            log::error!("Failed to open {}: {e}", served.path.display());
            return unavailable(StatusCode::NOT_FOUND);
        }
    };

    let body = Body::from_stream(ReaderStream::with_capacity(file, STREAM_CHUNK));
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    let descriptor = &served.descriptor;

    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(descriptor.mime),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(served.size));
    if let Some(encoding) = descriptor.encoding {
        headers.insert(
            header::CONTENT_ENCODING,
            HeaderValue::from_static(encoding.header_value()),
        );
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(descriptor.cache.header_value()),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("SAMEORIGIN"),
    );
    if descriptor.is_html() {
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("frame-ancestors 'self'"),
        );
    }
    if !production {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
    }
    response
}

/// 403 for traversal and policy denials, 404 for everything else.
pub(crate) fn content_status(err: &ContentError) -> StatusCode {
    match err {
        ContentError::PathTraversalAttempt(_) | ContentError::AccessDenied(_) => {
            StatusCode::FORBIDDEN
        }
        _ => StatusCode::NOT_FOUND,
    }
}

fn content_error_response(slug: &str, path: &str, err: ContentError) -> Response {
    match &err {
        // Logged under the security target where they are detected.
        e if e.is_security_event() => {}
        ContentError::Database(_) | ContentError::ExtractionIoFailure(_) => {
            log::error!("Serving '{slug}/{path}' failed: {err}")
        }
        _ => log::debug!("Serving '{slug}/{path}' refused: {err}"),
    }
    unavailable(content_status(&err))
}

fn unavailable(status: StatusCode) -> Response {
    (
        status,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        UNAVAILABLE,
    )
        .into_response()
}
