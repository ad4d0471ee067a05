use super::*;
use crate::database::models::{NewPackage, PackageKind};
use crate::services::config::GatewayConfig;
use crate::services::content_type::ContentEncoding;
use crate::test_utils::{init_test_coordinator, test_config, zip_bytes, TestContext};
use bytes::Bytes;
use std::fs;
use tempfile::TempDir;

struct DenyAll;

impl AccessPolicy for DenyAll {
    fn can_access(&self, _user_id: Option<&str>, _package_id: i64) -> bool {
        false
    }
}

/// Only "alice" may see anything.
struct OnlyAlice;

impl AccessPolicy for OnlyAlice {
    fn can_access(&self, user_id: Option<&str>, _package_id: i64) -> bool {
        user_id == Some("alice")
    }
}

async fn setup(
    config: &GatewayConfig,
    policy: Arc<dyn AccessPolicy>,
) -> (TestContext, SecureFileGateway, i64) {
    let (ctx, coordinator) = init_test_coordinator(config).await;
    let pkg = coordinator
        .create_package(&NewPackage {
            slug: "my-demo".into(),
            title: "My Demo".into(),
            kind: PackageKind::Webgl,
        })
        .await
        .unwrap();
    let zip = zip_bytes(&[
        ("index.html", b"<html>demo</html>"),
        ("Build/Build.wasm.br", b"brotli-wasm-bytes"),
        ("TemplateData/style.css", b"body{}"),
    ]);
    coordinator
        .on_archive_attached(pkg.id, "demo.zip", Bytes::from(zip))
        .await
        .unwrap();
    (ctx, SecureFileGateway::new(coordinator, policy), pkg.id)
}

#[tokio::test]
async fn test_resolves_file_with_headers() {
    let dir = TempDir::new().unwrap();
    let (_ctx, gateway, _) = setup(&test_config(dir.path()), Arc::new(AllowAll)).await;

    let served = gateway
        .resolve("my-demo", "Build/Build.wasm.br", None)
        .await
        .unwrap();
    assert_eq!(served.descriptor.mime, "application/wasm");
    assert_eq!(served.descriptor.encoding, Some(ContentEncoding::Brotli));
    assert_eq!(served.size, 17);
    assert_eq!(fs::read(&served.path).unwrap(), b"brotli-wasm-bytes");
}

#[tokio::test]
async fn test_traversal_is_rejected_before_lookup() {
    let dir = TempDir::new().unwrap();
    let (_ctx, gateway, _) = setup(&test_config(dir.path()), Arc::new(AllowAll)).await;

    for path in ["../../../etc/passwd", "/etc/passwd", "Build\\..\\..\\x", "a/../index.html"] {
        let err = gateway.resolve("my-demo", path, None).await.unwrap_err();
        assert!(
            matches!(err, ContentError::PathTraversalAttempt(_)),
            "{path} should be rejected, got {err:?}"
        );
    }
    // Shape check runs first, so even unknown packages answer 403 here.
    let err = gateway
        .resolve("no-such-demo", "../secret", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ContentError::PathTraversalAttempt(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_escape_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (_ctx, gateway, _) = setup(&test_config(dir.path()), Arc::new(AllowAll)).await;

    let outside = dir.path().join("secret.txt");
    fs::write(&outside, b"secret").unwrap();
    let root = dir.path().join("webgl_extracted").join("demo_my-demo");
    std::os::unix::fs::symlink(&outside, root.join("leak.txt")).unwrap();

    let err = gateway.resolve("my-demo", "leak.txt", None).await.unwrap_err();
    assert!(matches!(err, ContentError::PathTraversalAttempt(_)));
}

#[tokio::test]
async fn test_missing_and_directory_are_not_found() {
    let dir = TempDir::new().unwrap();
    let (_ctx, gateway, _) = setup(&test_config(dir.path()), Arc::new(AllowAll)).await;

    let missing = gateway.resolve("my-demo", "nope.js", None).await.unwrap_err();
    assert!(matches!(missing, ContentError::FileNotFound(_)));

    let directory = gateway.resolve("my-demo", "Build", None).await.unwrap_err();
    assert!(matches!(directory, ContentError::FileNotFound(_)));

    let unknown = gateway
        .resolve("other-demo", "index.html", None)
        .await
        .unwrap_err();
    assert!(matches!(unknown, ContentError::PackageNotFound(_)));
}

#[tokio::test]
async fn test_inactive_package_is_hidden() {
    let dir = TempDir::new().unwrap();
    let (_ctx, gateway, id) = setup(&test_config(dir.path()), Arc::new(AllowAll)).await;
    gateway.coordinator().set_active(id, false).await.unwrap();

    let err = gateway.resolve("my-demo", "index.html", None).await.unwrap_err();
    assert!(matches!(err, ContentError::PackageInactive(_)));
}

#[tokio::test]
async fn test_access_policy_denial() {
    let dir = TempDir::new().unwrap();
    let (_ctx, gateway, id) = setup(&test_config(dir.path()), Arc::new(DenyAll)).await;

    let err = gateway.resolve("my-demo", "index.html", None).await.unwrap_err();
    assert!(matches!(err, ContentError::AccessDenied(denied) if denied == id));
}

#[tokio::test]
async fn test_access_policy_sees_user() {
    let dir = TempDir::new().unwrap();
    let (_ctx, gateway, _) = setup(&test_config(dir.path()), Arc::new(OnlyAlice)).await;

    assert!(gateway
        .resolve("my-demo", "index.html", Some("alice"))
        .await
        .is_ok());
    assert!(matches!(
        gateway.resolve("my-demo", "index.html", Some("bob")).await,
        Err(ContentError::AccessDenied(_))
    ));
}

#[tokio::test]
async fn test_lazy_package_extracts_on_first_request() {
    let dir = TempDir::new().unwrap();
    let config = GatewayConfig {
        eager_extraction: false,
        ..test_config(dir.path())
    };
    let (_ctx, gateway, _) = setup(&config, Arc::new(AllowAll)).await;
    assert_eq!(gateway.coordinator().extractions_run(), 0);

    let served = gateway
        .resolve("my-demo", "TemplateData/style.css", None)
        .await
        .unwrap();
    assert_eq!(served.descriptor.mime, "text/css; charset=utf-8");
    assert_eq!(gateway.coordinator().extractions_run(), 1);

    gateway.resolve("my-demo", "index.html", None).await.unwrap();
    assert_eq!(gateway.coordinator().extractions_run(), 1);
}

#[tokio::test]
async fn test_entry_redirect() {
    let dir = TempDir::new().unwrap();
    let (_ctx, gateway, _) = setup(&test_config(dir.path()), Arc::new(AllowAll)).await;

    assert_eq!(
        gateway.entry_redirect("my-demo", None).await.unwrap(),
        "/content/my-demo/index.html"
    );
}
