use super::models::{ContentPackage, ExtractionStatus, NewPackage, PackageKind, SourceRecord};
use sqlx::SqlitePool;

const PACKAGE_COLUMNS: &str = "id, slug, title, kind, source_archive_ref, standalone_file_ref, \
     source_file_name, source_digest, source_size, extracted_root_path, \
     entry_point_relative_path, extraction_status, last_error, last_extracted_at, active";

// ── Content packages CRUD ───────────────────────────────────

/// Insert a new package row (no source, not extracted). Returns the new id.
pub async fn insert_package(pool: &SqlitePool, package: &NewPackage) -> Result<i64, sqlx::Error> {
    let result = sqlx::query("INSERT INTO content_packages (slug, title, kind) VALUES (?, ?, ?)")
        .bind(&package.slug)
        .bind(&package.title)
        .bind(package.kind)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get_package(pool: &SqlitePool, id: i64) -> Result<Option<ContentPackage>, sqlx::Error> {
    let sql = format!("SELECT {PACKAGE_COLUMNS} FROM content_packages WHERE id = ?");
    sqlx::query_as::<_, ContentPackage>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_package_by_slug(
    pool: &SqlitePool,
    slug: &str,
) -> Result<Option<ContentPackage>, sqlx::Error> {
    let sql = format!("SELECT {PACKAGE_COLUMNS} FROM content_packages WHERE slug = ?");
    sqlx::query_as::<_, ContentPackage>(&sql)
        .bind(slug)
        .fetch_optional(pool)
        .await
}

/// All packages, newest first.
pub async fn list_packages(pool: &SqlitePool) -> Result<Vec<ContentPackage>, sqlx::Error> {
    let sql = format!("SELECT {PACKAGE_COLUMNS} FROM content_packages ORDER BY id DESC");
    sqlx::query_as::<_, ContentPackage>(&sql).fetch_all(pool).await
}

/// Replace the attached source. Clears any recorded extraction in the same
/// statement so the row never points at content from the previous source.
pub async fn set_source(
    pool: &SqlitePool,
    id: i64,
    kind: PackageKind,
    source: &SourceRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE content_packages
         SET kind = ?, source_archive_ref = ?, standalone_file_ref = ?, source_file_name = ?,
             source_digest = ?, source_size = ?, extracted_root_path = NULL,
             entry_point_relative_path = NULL, extraction_status = 'not_extracted',
             last_error = NULL, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(kind)
    .bind(&source.archive_ref)
    .bind(&source.standalone_ref)
    .bind(&source.file_name)
    .bind(&source.digest)
    .bind(source.size)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a successful extraction. Root and entry point are written together.
pub async fn record_extraction(
    pool: &SqlitePool,
    id: i64,
    root_path: &str,
    entry_point: &str,
    extracted_at: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE content_packages
         SET extracted_root_path = ?, entry_point_relative_path = ?, extraction_status = 'extracted',
             last_error = NULL, last_extracted_at = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(root_path)
    .bind(entry_point)
    .bind(extracted_at)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Forget the recorded extraction (root and entry point together).
pub async fn clear_extraction(
    pool: &SqlitePool,
    id: i64,
    status: ExtractionStatus,
    last_error: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE content_packages
         SET extracted_root_path = NULL, entry_point_relative_path = NULL, extraction_status = ?,
             last_error = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(status)
    .bind(last_error)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_active(pool: &SqlitePool, id: i64, active: bool) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE content_packages SET active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(active)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_package(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM content_packages WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
#[path = "tests/package_repo_test.rs"]
mod tests;
