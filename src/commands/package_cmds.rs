//! Admin API for content packages.
//!
//! | Method | Path                              | Action                      |
//! |--------|-----------------------------------|-----------------------------|
//! | GET    | /api/packages                     | list                        |
//! | POST   | /api/packages                     | create                      |
//! | GET    | /api/packages/:id                 | get                         |
//! | DELETE | /api/packages/:id                 | delete with files           |
//! | PUT    | /api/packages/:id/archive         | attach source (raw body)    |
//! | POST   | /api/packages/:id/extract         | extract (`?force=true`)     |
//! | PUT    | /api/packages/:id/active          | activate / deactivate       |
//! | GET    | /api/packages/:id/files           | extracted file report       |
//! | GET    | /api/packages/:id/analysis        | inspect stored archive      |
//! | POST   | /api/reconcile                    | reconcile rows with disk    |

use super::AppState;
use crate::database::models::{ContentPackage, NewPackage};
use crate::services::archive::ArchiveAnalysis;
use crate::services::config::GatewayConfig;
use crate::services::lifecycle::{FileReport, PackageState, ReconcileReport};
use crate::types::errors::ContentError;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

pub fn package_router(config: &GatewayConfig) -> Router<AppState> {
    let body_limit = usize::try_from(config.max_upload_bytes).unwrap_or(usize::MAX);

    Router::new()
        .route("/api/packages", get(list_packages).post(create_package))
        .route("/api/packages/:id", get(get_package).delete(delete_package))
        .route("/api/packages/:id/archive", put(attach_archive))
        .route("/api/packages/:id/extract", post(extract_package))
        .route("/api/packages/:id/active", put(set_active))
        .route("/api/packages/:id/files", get(file_report))
        .route("/api/packages/:id/analysis", get(analyze_package))
        .route("/api/reconcile", post(reconcile))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(build_cors(&config.cors_origins))
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(parsed)
    }
}

// =============================================================================
// Types
// =============================================================================

/// A package row plus what the coordinator knows about it.
#[derive(Debug, Serialize)]
pub struct PackageView {
    #[serde(flatten)]
    pub package: ContentPackage,
    pub state: PackageState,
    pub entry_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AttachParams {
    pub filename: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtractParams {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

/// `ContentError` rendered as `{"code", "message"}` with a matching status.
pub struct ApiError(pub ContentError);

impl From<ContentError> for ApiError {
    fn from(error: ContentError) -> Self {
        ApiError(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ContentError::PackageNotFound(_) | ContentError::FileNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ContentError::CorruptArchive(_)
            | ContentError::UnsafeArchiveEntry { .. }
            | ContentError::InvalidUpload(_)
            | ContentError::NoEntryPointFound => StatusCode::UNPROCESSABLE_ENTITY,
            ContentError::NoSourceAttached(_)
            | ContentError::PackageInactive(_)
            | ContentError::PackageBusy(_) => StatusCode::CONFLICT,
            ContentError::PathTraversalAttempt(_) | ContentError::AccessDenied(_) => {
                StatusCode::FORBIDDEN
            }
            ContentError::ExtractionIoFailure(_) | ContentError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Admin request failed: {}", self.0);
        }
        (status, Json(self.0)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn view(state: &AppState, package: ContentPackage) -> PackageView {
    PackageView {
        state: state.coordinator.state_of(&package),
        entry_url: package.entry_url(),
        package,
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn list_packages(State(state): State<AppState>) -> ApiResult<Vec<PackageView>> {
    let packages = state.coordinator.list_packages().await?;
    Ok(Json(packages.into_iter().map(|p| view(&state, p)).collect()))
}

async fn create_package(
    State(state): State<AppState>,
    Json(request): Json<NewPackage>,
) -> Result<(StatusCode, Json<PackageView>), ApiError> {
    let package = state.coordinator.create_package(&request).await?;
    Ok((StatusCode::CREATED, Json(view(&state, package))))
}

async fn get_package(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<PackageView> {
    let package = state.coordinator.get_package(id).await?;
    Ok(Json(view(&state, package)))
}

async fn delete_package(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.coordinator.on_package_deleted(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ContentError::PackageNotFound(id.to_string()).into())
    }
}

/// Raw upload body; the original file name comes from `?filename=`.
async fn attach_archive(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<AttachParams>,
    body: Bytes,
) -> ApiResult<PackageView> {
    let package = state
        .coordinator
        .on_archive_attached(id, &params.filename, body)
        .await?;
    Ok(Json(view(&state, package)))
}

async fn extract_package(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<ExtractParams>,
) -> ApiResult<PackageView> {
    let package = state.coordinator.extract_now(id, params.force).await?;
    Ok(Json(view(&state, package)))
}

async fn set_active(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<SetActiveRequest>,
) -> ApiResult<PackageView> {
    let package = state.coordinator.set_active(id, request.active).await?;
    Ok(Json(view(&state, package)))
}

async fn file_report(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<FileReport> {
    Ok(Json(state.coordinator.file_report(id).await?))
}

async fn analyze_package(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ArchiveAnalysis> {
    Ok(Json(state.coordinator.analyze_source(id).await?))
}

async fn reconcile(State(state): State<AppState>) -> ApiResult<ReconcileReport> {
    Ok(Json(state.coordinator.reconcile_all().await?))
}
