#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, Response};
use axum::Router;
use demo_vault_lib::commands::{build_router, AppState};
use demo_vault_lib::services::config::GatewayConfig;
use demo_vault_lib::services::gateway::AllowAll;
use demo_vault_lib::services::lifecycle::PackageLifecycleCoordinator;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tower::ServiceExt;

static INIT: Once = Once::new();

pub struct TestContext {
    pub pool: Pool<Sqlite>,
}

pub async fn init_test_db() -> TestContext {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    TestContext { pool }
}

/// A running app over a sandbox media root.
pub struct TestApp {
    pub media: TempDir,
    pub ctx: TestContext,
    pub coordinator: Arc<PackageLifecycleCoordinator>,
    pub router: Router,
}

pub fn test_config(media_root: &Path) -> GatewayConfig {
    GatewayConfig {
        media_root: media_root.to_path_buf(),
        extraction_timeout_secs: 30,
        lock_timeout_secs: 10,
        ..GatewayConfig::default()
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(tweak: impl FnOnce(&mut GatewayConfig)) -> TestApp {
    let media = TempDir::new().unwrap();
    let mut config = test_config(media.path());
    tweak(&mut config);

    let ctx = init_test_db().await;
    let config = Arc::new(config);
    let coordinator = Arc::new(PackageLifecycleCoordinator::new(ctx.pool.clone(), &config));
    let state = AppState::new(coordinator.clone(), Arc::new(AllowAll), config);

    TestApp {
        media,
        ctx,
        coordinator,
        router: build_router(state),
    }
}

impl TestApp {
    pub async fn request(&self, method: Method, uri: &str, body: Body) -> Response<Body> {
        self.router
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(body).unwrap())
            .await
            .unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.request(Method::GET, uri, Body::empty()).await
    }

    pub async fn json(&self, method: Method, uri: &str, value: serde_json::Value) -> Response<Body> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Create a package and return its id.
    pub async fn create_package(&self, slug: &str, kind: &str) -> i64 {
        let response = self
            .json(
                Method::POST,
                "/api/packages",
                serde_json::json!({ "slug": slug, "title": slug, "kind": kind }),
            )
            .await;
        assert_eq!(response.status(), 201);
        body_json(response).await["id"].as_i64().unwrap()
    }

    pub async fn upload(&self, id: i64, file_name: &str, bytes: Vec<u8>) -> Response<Body> {
        self.request(
            Method::PUT,
            &format!("/api/packages/{id}/archive?filename={file_name}"),
            Body::from(bytes),
        )
        .await
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// In-memory ZIP with the given file entries.
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in files {
        writer.start_file(name.to_string(), options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
