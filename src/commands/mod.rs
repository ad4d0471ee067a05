pub mod content_cmds;
pub mod package_cmds;

use crate::services::config::GatewayConfig;
use crate::services::gateway::{AccessPolicy, SecureFileGateway};
use crate::services::lifecycle::PackageLifecycleCoordinator;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<PackageLifecycleCoordinator>,
    pub gateway: Arc<SecureFileGateway>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(
        coordinator: Arc<PackageLifecycleCoordinator>,
        policy: Arc<dyn AccessPolicy>,
        config: Arc<GatewayConfig>,
    ) -> Self {
        let gateway = Arc::new(SecureFileGateway::new(coordinator.clone(), policy));
        Self {
            coordinator,
            gateway,
            config,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(content_cmds::content_router())
        .merge(package_cmds::package_router(&state.config))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
