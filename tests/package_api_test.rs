mod common;

use axum::body::Body;
use axum::http::{Method, StatusCode};
use common::{body_json, spawn_app, spawn_app_with, zip_bytes};
use serde_json::json;

#[tokio::test]
async fn test_health() {
    let app = spawn_app().await;
    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_create_upload_and_inspect() {
    let app = spawn_app().await;
    let id = app.create_package("my-demo", "webgl").await;

    let created = body_json(app.get(&format!("/api/packages/{id}")).await).await;
    assert_eq!(created["state"], "no_archive");
    assert!(created["entry_url"].is_null());

    let zip = zip_bytes(&[("index.html", b"<html></html>"), ("Build/app.js", b"var a;")]);
    let response = app.upload(id, "demo.zip", zip).await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    assert_eq!(view["state"], "extracted");
    assert_eq!(view["extraction_status"], "extracted");
    assert_eq!(view["entry_url"], "/content/my-demo/index.html");
    assert_eq!(view["source_file_name"], "demo.zip");

    let report = body_json(app.get(&format!("/api/packages/{id}/files")).await).await;
    assert_eq!(report["files"].as_array().unwrap().len(), 2);
    assert_eq!(report["total_bytes"], 19);

    let analysis = body_json(app.get(&format!("/api/packages/{id}/analysis")).await).await;
    assert_eq!(analysis["file_count"], 2);

    let list = body_json(app.get("/api/packages").await).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_rejects_bad_slug_and_duplicates() {
    let app = spawn_app().await;

    let bad = app
        .json(
            Method::POST,
            "/api/packages",
            json!({ "slug": "../etc", "kind": "webgl" }),
        )
        .await;
    assert_eq!(bad.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(bad).await["code"], "INVALID_UPLOAD");

    app.create_package("taken", "lms").await;
    let duplicate = app
        .json(
            Method::POST,
            "/api/packages",
            json!({ "slug": "taken", "kind": "lms" }),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_unsafe_upload_keeps_previous_content() {
    let app = spawn_app().await;
    let id = app.create_package("my-demo", "webgl").await;
    app.upload(id, "v1.zip", zip_bytes(&[("index.html", b"v1")]))
        .await;

    let evil = zip_bytes(&[("index.html", b"v2"), ("../../etc/passwd", b"root")]);
    let response = app.upload(id, "v2.zip", evil).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["code"], "UNSAFE_ARCHIVE_ENTRY");

    let page = app.get("/content/my-demo/index.html").await;
    assert_eq!(common::body_bytes(page).await, b"v1");
    assert!(!app.media.path().join("etc").exists());
}

#[tokio::test]
async fn test_corrupt_and_wrong_type_uploads() {
    let app = spawn_app().await;
    let id = app.create_package("my-demo", "webgl").await;

    let corrupt = app.upload(id, "demo.zip", b"PK\x03\x04 not really".to_vec()).await;
    assert_eq!(corrupt.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(corrupt).await["code"], "CORRUPT_ARCHIVE");

    let exe = app.upload(id, "setup.exe", b"MZ".to_vec()).await;
    assert_eq!(exe.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(exe).await["code"], "INVALID_UPLOAD");

    let view = body_json(app.get(&format!("/api/packages/{id}")).await).await;
    assert_eq!(view["state"], "no_archive");
}

#[tokio::test]
async fn test_replacement_removes_old_files() {
    let app = spawn_app().await;
    let id = app.create_package("my-demo", "webgl").await;
    app.upload(
        id,
        "v1.zip",
        zip_bytes(&[("index.html", b"v1"), ("old.js", b"old")]),
    )
    .await;
    assert_eq!(app.get("/content/my-demo/old.js").await.status(), StatusCode::OK);

    app.upload(
        id,
        "v2.zip",
        zip_bytes(&[("index.html", b"v2"), ("new.js", b"new")]),
    )
    .await;

    assert_eq!(
        app.get("/content/my-demo/old.js").await.status(),
        StatusCode::NOT_FOUND
    );
    let page = app.get("/content/my-demo/index.html").await;
    assert_eq!(common::body_bytes(page).await, b"v2");
}

#[tokio::test]
async fn test_no_entry_point_reported() {
    let app = spawn_app().await;
    let id = app.create_package("my-demo", "webgl").await;

    let response = app
        .upload(id, "assets.zip", zip_bytes(&[("readme.txt", b"no html here")]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    assert_eq!(view["extraction_status"], "no_entry_point");
    assert!(view["extracted_root_path"].is_null());

    let extract = app
        .request(
            Method::POST,
            &format!("/api/packages/{id}/extract"),
            Body::empty(),
        )
        .await;
    assert_eq!(extract.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(extract).await["code"], "NO_ENTRY_POINT_FOUND");
    assert_eq!(
        app.get("/content/my-demo").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_extract_without_source_conflicts() {
    let app = spawn_app().await;
    let id = app.create_package("my-demo", "lms").await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/packages/{id}/extract"),
            Body::empty(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "NO_SOURCE_ATTACHED");
}

#[tokio::test]
async fn test_lazy_upload_then_forced_extract() {
    let app = spawn_app_with(|c| c.eager_extraction = false).await;
    let id = app.create_package("my-demo", "webgl").await;

    let view = body_json(
        app.upload(id, "demo.zip", zip_bytes(&[("index.html", b"x")]))
            .await,
    )
    .await;
    assert_eq!(view["state"], "not_extracted");

    let response = app
        .request(
            Method::POST,
            &format!("/api/packages/{id}/extract?force=true"),
            Body::empty(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["state"], "extracted");
    assert_eq!(app.coordinator.extractions_run(), 1);
}

#[tokio::test]
async fn test_deactivate_and_delete() {
    let app = spawn_app().await;
    let id = app.create_package("my-demo", "webgl").await;
    app.upload(id, "demo.zip", zip_bytes(&[("index.html", b"x")]))
        .await;

    let response = app
        .json(
            Method::PUT,
            &format!("/api/packages/{id}/active"),
            json!({ "active": false }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["active"], false);
    assert_eq!(
        app.get("/content/my-demo/index.html").await.status(),
        StatusCode::NOT_FOUND
    );

    let deleted = app
        .request(Method::DELETE, &format!("/api/packages/{id}"), Body::empty())
        .await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    assert!(!app
        .media
        .path()
        .join("webgl_extracted")
        .join("demo_my-demo")
        .exists());

    let again = app
        .request(Method::DELETE, &format!("/api/packages/{id}"), Body::empty())
        .await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.get(&format!("/api/packages/{id}")).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_reconcile_restores_missing_extraction() {
    let app = spawn_app().await;
    let id = app.create_package("my-demo", "webgl").await;
    app.upload(id, "demo.zip", zip_bytes(&[("index.html", b"x")]))
        .await;
    std::fs::remove_dir_all(app.media.path().join("webgl_extracted").join("demo_my-demo"))
        .unwrap();

    let response = app
        .request(Method::POST, "/api/reconcile", Body::empty())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["cleared_missing"], 1);
    assert_eq!(report["extracted"], 1);

    assert_eq!(
        app.get("/content/my-demo/index.html").await.status(),
        StatusCode::OK
    );
}
