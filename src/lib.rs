pub mod commands;
pub mod database;
pub mod services;
pub mod types;
#[cfg(test)]
pub mod test_utils;

use commands::AppState;
use services::config::GatewayConfig;
use services::gateway::AllowAll;
use services::lifecycle::PackageLifecycleCoordinator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;

/// Open the database, reconcile packages with disk, then serve until the
/// process is stopped.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.media_root)?;

    let opts = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;

    // Run standard sqlx migrations (compiled into the binary)
    sqlx::migrate!("./migrations").run(&pool).await?;

    let config = Arc::new(config);
    let coordinator = Arc::new(PackageLifecycleCoordinator::new(pool, &config));

    match coordinator.startup_reconcile().await {
        Ok(report) => log::info!(
            "Startup reconcile: swept {} leftovers, cleared {} missing, extracted {}, failed {}",
            report.swept_leftovers,
            report.cleared_missing,
            report.extracted,
            report.failed
        ),
        Err(e) => log::warn!("Startup reconcile skipped: {e}"),
    }

    let state = AppState::new(coordinator, Arc::new(AllowAll), config.clone());
    let app = commands::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    log::info!(
        "Serving {} on {} (production: {})",
        config.media_root.display(),
        config.bind_addr,
        config.production
    );
    axum::serve(listener, app).await?;
    Ok(())
}
