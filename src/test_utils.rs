use crate::services::config::GatewayConfig;
use crate::services::lifecycle::PackageLifecycleCoordinator;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

pub struct TestContext {
    pub pool: Pool<Sqlite>,
}

pub async fn init_test_db() -> TestContext {
    INIT.call_once(|| {
        // Initialize logger only once
        let _ = env_logger::builder().is_test(true).try_init();
    });

    // Single connection: every query sees the same in-memory database
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

/// Config pointing at a sandbox media root, with short timeouts.
pub fn test_config(media_root: &Path) -> GatewayConfig {
    GatewayConfig {
        media_root: media_root.to_path_buf(),
        extraction_timeout_secs: 30,
        lock_timeout_secs: 10,
        ..GatewayConfig::default()
    }
}

pub async fn init_test_coordinator(
    config: &GatewayConfig,
) -> (TestContext, Arc<PackageLifecycleCoordinator>) {
    let ctx = init_test_db().await;
    let coordinator = Arc::new(PackageLifecycleCoordinator::new(ctx.pool.clone(), config));
    (ctx, coordinator)
}

/// In-memory ZIP with the given file entries.
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in files {
        writer
            .start_file(name.to_string(), options)
            .expect("start zip entry");
        writer.write_all(content).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}
