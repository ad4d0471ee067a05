//! Package lifecycle: attach, extract, invalidate, delete.
//!
//! The coordinator is the only writer of extraction directories and of the
//! extraction columns. Every mutation of one package runs under that
//! package's lock, and the row is re-read after the lock is taken, so
//! concurrent first requests collapse into a single extraction.

mod types;

pub use types::{ExtractedFileInfo, FileReport, PackageState, ReconcileReport};

use crate::database::models::{
    is_valid_slug, ContentPackage, ExtractionStatus, NewPackage, SourceRecord,
};
use crate::database::package_repo;
use crate::services::archive::{
    analyze_archive, ArchiveAnalysis, CancelFlag, ExtractionEngine, ExtractionResult, SourceFormat,
};
use crate::services::archive_store::{ArchiveStore, StoredSource};
use crate::services::config::GatewayConfig;
use crate::services::core::operation_lock::PackageLocks;
use crate::services::entry_point::EntryPointResolver;
use crate::services::fs_utils::path_utils::to_slash_relative;
use crate::types::errors::{ContentError, ContentResult};
use bytes::Bytes;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use walkdir::WalkDir;

pub struct PackageLifecycleCoordinator {
    pool: SqlitePool,
    engine: Arc<ExtractionEngine>,
    store: ArchiveStore,
    resolver: Arc<EntryPointResolver>,
    locks: PackageLocks,
    eager_extraction: bool,
    extraction_timeout: Duration,
    lock_timeout: Duration,
    max_upload_bytes: u64,
    extractions_run: AtomicU64,
}

impl PackageLifecycleCoordinator {
    pub fn new(pool: SqlitePool, config: &GatewayConfig) -> Self {
        Self {
            pool,
            engine: Arc::new(ExtractionEngine::new(&config.media_root, config.limits)),
            store: ArchiveStore::new(&config.media_root),
            resolver: Arc::new(EntryPointResolver::new(config.entry_search_depth)),
            locks: PackageLocks::new(),
            eager_extraction: config.eager_extraction,
            extraction_timeout: config.extraction_timeout(),
            lock_timeout: config.lock_timeout(),
            max_upload_bytes: config.max_upload_bytes,
            extractions_run: AtomicU64::new(0),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn engine(&self) -> &ExtractionEngine {
        &self.engine
    }

    /// Number of extraction workers started since construction.
    pub fn extractions_run(&self) -> u64 {
        self.extractions_run.load(Ordering::SeqCst)
    }

    // ── Lookups ─────────────────────────────────────────────

    pub async fn get_package(&self, id: i64) -> ContentResult<ContentPackage> {
        package_repo::get_package(&self.pool, id)
            .await?
            .ok_or_else(|| ContentError::PackageNotFound(id.to_string()))
    }

    pub async fn get_package_by_slug(&self, slug: &str) -> ContentResult<Option<ContentPackage>> {
        Ok(package_repo::get_package_by_slug(&self.pool, slug).await?)
    }

    pub async fn list_packages(&self) -> ContentResult<Vec<ContentPackage>> {
        Ok(package_repo::list_packages(&self.pool).await?)
    }

    pub async fn state(&self, id: i64) -> ContentResult<PackageState> {
        let pkg = self.get_package(id).await?;
        Ok(self.state_of(&pkg))
    }

    /// State of an already loaded row.
    pub fn state_of(&self, pkg: &ContentPackage) -> PackageState {
        if !pkg.has_source() {
            return PackageState::NoArchive;
        }
        match pkg.extraction() {
            None => PackageState::NotExtracted,
            Some((root, _)) => match self.engine.absolute_root(root) {
                Ok(path) if path.is_dir() => PackageState::Extracted,
                _ => PackageState::Stale,
            },
        }
    }

    // ── Mutations ───────────────────────────────────────────

    pub async fn create_package(&self, new: &NewPackage) -> ContentResult<ContentPackage> {
        if !is_valid_slug(&new.slug) {
            return Err(ContentError::InvalidUpload(format!(
                "invalid slug '{}': use lowercase letters, digits, '-' and '_'",
                new.slug
            )));
        }
        let id = match package_repo::insert_package(&self.pool, new).await {
            Ok(id) => id,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(ContentError::InvalidUpload(format!(
                    "slug '{}' is already taken",
                    new.slug
                )))
            }
            Err(e) => return Err(e.into()),
        };
        log::info!("Created {} package '{}' (id {id})", new.kind, new.slug);
        self.get_package(id).await
    }

    /// Accept a new source for a package.
    ///
    /// Rejections (bad type, corrupt or unsafe archive, failed extraction)
    /// leave the previous source, row and directory exactly as they were.
    /// With eager extraction the new content is live when this returns.
    pub async fn on_archive_attached(
        &self,
        id: i64,
        file_name: &str,
        bytes: Bytes,
    ) -> ContentResult<ContentPackage> {
        let _guard = self.lock(id).await?;
        let pkg = self.get_package(id).await?;
        ArchiveStore::validate_upload(pkg.kind, file_name, &bytes, self.max_upload_bytes)?;

        let digest = blake3::hash(&bytes).to_hex().to_string();
        if pkg.source_digest.as_deref() == Some(digest.as_str())
            && self.state_of(&pkg) == PackageState::Extracted
        {
            log::info!("Upload for '{}' matches the current source, nothing to do", pkg.slug);
            return Ok(pkg);
        }

        let stored = {
            let store = self.store.clone();
            let (kind, slug, name) = (pkg.kind, pkg.slug.clone(), file_name.to_string());
            blocking(move || store.store(kind, &slug, &name, &bytes)).await?
        };

        match self.apply_new_source(&pkg, &stored, file_name).await {
            Ok(updated) => {
                if let Some(old) = pkg.source_ref() {
                    if old != stored.reference {
                        if let Err(e) = self.store.remove(old) {
                            log::warn!("Failed to remove previous source {old}: {e}");
                        }
                    }
                }
                Ok(updated)
            }
            Err(e) => {
                if let Err(cleanup) = self.store.remove(&stored.reference) {
                    log::warn!("Failed to discard rejected upload {}: {cleanup}", stored.reference);
                }
                if e.is_archive_rejection() {
                    log::warn!("Rejected upload '{file_name}' for '{}': {e}", pkg.slug);
                } else {
                    log::error!("Upload '{file_name}' for '{}' failed: {e}", pkg.slug);
                }
                Err(e)
            }
        }
    }

    async fn apply_new_source(
        &self,
        pkg: &ContentPackage,
        stored: &StoredSource,
        file_name: &str,
    ) -> ContentResult<ContentPackage> {
        let stored_path = self.store.path(&stored.reference)?;

        if stored.format.is_archive() {
            let path = stored_path.clone();
            let analysis = blocking(move || analyze_archive(&path)).await?;
            if let Some((entry, reason)) = analysis.unsafe_entries.first() {
                log::warn!(
                    target: "security",
                    "Upload for '{}' contains unsafe entry '{entry}' ({reason})",
                    pkg.slug
                );
                return Err(ContentError::UnsafeArchiveEntry {
                    entry: entry.clone(),
                    reason: *reason,
                });
            }
        }

        let is_archive = stored.format.is_archive();
        let source = SourceRecord {
            archive_ref: is_archive.then(|| stored.reference.clone()),
            standalone_ref: (!is_archive).then(|| stored.reference.clone()),
            file_name: file_name.to_string(),
            digest: stored.digest.clone(),
            size: stored.size as i64,
        };

        if !self.eager_extraction {
            package_repo::set_source(&self.pool, pkg.id, pkg.kind, &source).await?;
            // The old directory belongs to the old source.
            if let Err(e) = self.remove_extraction_dir(pkg).await {
                log::warn!("Failed to remove stale extraction for '{}': {e}", pkg.slug);
            }
            log::info!("Source for '{}' replaced, extraction deferred", pkg.slug);
            return self.get_package(pkg.id).await;
        }

        let (result, entry) = self
            .run_extraction(
                stored_path,
                stored.format,
                file_name.to_string(),
                pkg.clone(),
            )
            .await?;
        package_repo::set_source(&self.pool, pkg.id, pkg.kind, &source).await?;
        self.record_outcome(pkg, &result, entry).await?;
        self.get_package(pkg.id).await
    }

    /// Make sure the package is extracted, extracting it now if needed.
    ///
    /// Idempotent: an extracted package is returned untouched. A package whose
    /// last extraction found no entry point, or failed, is not retried until
    /// its source changes or a forced extract is requested.
    pub async fn ensure_extracted(&self, id: i64) -> ContentResult<ContentPackage> {
        let pkg = self.get_package(id).await?;
        if self.state_of(&pkg) == PackageState::Extracted {
            return Ok(pkg);
        }

        let _guard = self.lock(id).await?;
        let pkg = self.get_package(id).await?;
        match self.state_of(&pkg) {
            PackageState::Extracted => return Ok(pkg),
            PackageState::NoArchive => return Err(ContentError::NoSourceAttached(id)),
            PackageState::Stale => {
                log::warn!(
                    "Extraction directory for '{}' is missing, extracting again",
                    pkg.slug
                );
                package_repo::clear_extraction(&self.pool, id, ExtractionStatus::NotExtracted, None)
                    .await?;
            }
            PackageState::NotExtracted => match pkg.extraction_status {
                ExtractionStatus::NoEntryPoint => return Err(ContentError::NoEntryPointFound),
                ExtractionStatus::Failed => {
                    return Err(ContentError::ExtractionIoFailure(
                        pkg.last_error
                            .clone()
                            .unwrap_or_else(|| "previous extraction failed".to_string()),
                    ))
                }
                _ => {}
            },
        }

        self.extract_locked(&pkg).await
    }

    /// Extract again from the stored source. With `force`, an existing
    /// extraction is discarded first.
    pub async fn extract_now(&self, id: i64, force: bool) -> ContentResult<ContentPackage> {
        if force {
            self.invalidate(id).await?;
        }
        self.ensure_extracted(id).await
    }

    /// Drop the extraction of a package; the next request extracts again.
    pub async fn invalidate(&self, id: i64) -> ContentResult<()> {
        let _guard = self.lock(id).await?;
        let pkg = self.get_package(id).await?;
        self.remove_extraction_dir(&pkg).await?;
        package_repo::clear_extraction(&self.pool, id, ExtractionStatus::NotExtracted, None).await?;
        log::info!("Invalidated extraction of '{}'", pkg.slug);
        Ok(())
    }

    /// Remove a package with its stored sources and extraction directory.
    /// Returns `false` if it did not exist.
    pub async fn on_package_deleted(&self, id: i64) -> ContentResult<bool> {
        let guard = self.lock(id).await?;
        let Some(pkg) = package_repo::get_package(&self.pool, id).await? else {
            return Ok(false);
        };

        self.remove_extraction_dir(&pkg).await?;
        let store = self.store.clone();
        let (kind, slug) = (pkg.kind, pkg.slug.clone());
        blocking(move || store.remove_package(kind, &slug)).await?;
        let deleted = package_repo::delete_package(&self.pool, id).await?;

        drop(guard);
        self.locks.forget(id);
        log::info!("Deleted package '{}' (id {id})", pkg.slug);
        Ok(deleted)
    }

    pub async fn set_active(&self, id: i64, active: bool) -> ContentResult<ContentPackage> {
        if !package_repo::set_active(&self.pool, id, active).await? {
            return Err(ContentError::PackageNotFound(id.to_string()));
        }
        self.get_package(id).await
    }

    // ── Reports ─────────────────────────────────────────────

    pub async fn file_report(&self, id: i64) -> ContentResult<FileReport> {
        let pkg = self.get_package(id).await?;
        let state = self.state_of(&pkg);

        let files = match (state, pkg.extraction()) {
            (PackageState::Extracted, Some((root, _))) => {
                let root = self.engine.absolute_root(root)?;
                blocking(move || Ok(list_files(&root))).await?
            }
            _ => Vec::new(),
        };
        let total_bytes = files.iter().map(|f| f.size).sum();

        Ok(FileReport {
            package_id: pkg.id,
            slug: pkg.slug.clone(),
            state,
            entry_point: pkg.entry_point_relative_path.clone(),
            entry_url: pkg.entry_url(),
            files,
            total_bytes,
        })
    }

    /// Inspect the stored archive without extracting it.
    pub async fn analyze_source(&self, id: i64) -> ContentResult<ArchiveAnalysis> {
        let pkg = self.get_package(id).await?;
        let reference = match (&pkg.source_archive_ref, &pkg.standalone_file_ref) {
            (Some(reference), _) => reference.clone(),
            (None, Some(_)) => {
                return Err(ContentError::InvalidUpload(format!(
                    "package '{}' has a standalone file, not an archive",
                    pkg.slug
                )))
            }
            (None, None) => return Err(ContentError::NoSourceAttached(id)),
        };
        let path = self.store.path(&reference)?;
        blocking(move || analyze_archive(&path)).await
    }

    // ── Reconcile ───────────────────────────────────────────

    /// Startup pass: sweep crash leftovers, then reconcile rows with disk.
    pub async fn startup_reconcile(&self) -> ContentResult<ReconcileReport> {
        let engine = self.engine.clone();
        let swept = blocking(move || Ok(engine.sweep_leftovers())).await?;
        let mut report = self.reconcile_all().await?;
        report.swept_leftovers = swept;
        Ok(report)
    }

    /// Clear rows whose directory vanished, then extract every active package
    /// that has a source but no extraction.
    pub async fn reconcile_all(&self) -> ContentResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for pkg in package_repo::list_packages(&self.pool).await? {
            if self.state_of(&pkg) != PackageState::Stale {
                continue;
            }
            let _guard = self.lock(pkg.id).await?;
            let current = self.get_package(pkg.id).await?;
            if self.state_of(&current) == PackageState::Stale {
                package_repo::clear_extraction(
                    &self.pool,
                    pkg.id,
                    ExtractionStatus::NotExtracted,
                    None,
                )
                .await?;
                log::warn!("Cleared missing extraction of '{}'", pkg.slug);
                report.cleared_missing += 1;
            }
        }

        for pkg in package_repo::list_packages(&self.pool).await? {
            if !pkg.active
                || !pkg.has_source()
                || pkg.extraction().is_some()
                || pkg.extraction_status == ExtractionStatus::NoEntryPoint
            {
                continue;
            }
            match self.ensure_extracted(pkg.id).await {
                Ok(_) => report.extracted += 1,
                Err(e) => {
                    log::warn!("Reconcile could not extract '{}': {e}", pkg.slug);
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Reconcile finished: {} cleared, {} extracted, {} failed",
            report.cleared_missing,
            report.extracted,
            report.failed
        );
        Ok(report)
    }

    // ── Internals ───────────────────────────────────────────

    async fn lock(&self, id: i64) -> ContentResult<OwnedMutexGuard<()>> {
        self.locks
            .acquire(id, self.lock_timeout)
            .await
            .map_err(|_| ContentError::PackageBusy(id))
    }

    /// Caller holds the package lock.
    async fn extract_locked(&self, pkg: &ContentPackage) -> ContentResult<ContentPackage> {
        let reference = pkg
            .source_ref()
            .ok_or(ContentError::NoSourceAttached(pkg.id))?;
        let source_path = self.store.path(reference)?;
        let file_name = pkg
            .source_file_name
            .clone()
            .unwrap_or_else(|| reference.rsplit('/').next().unwrap_or(reference).to_string());
        let format = if pkg.source_archive_ref.is_some() {
            SourceFormat::Zip
        } else {
            SourceFormat::from_path(Path::new(&file_name)).ok_or_else(|| {
                ContentError::InvalidUpload(format!("unrecognized source '{file_name}'"))
            })?
        };

        match self
            .run_extraction(source_path, format, file_name, pkg.clone())
            .await
        {
            Ok((result, entry)) => {
                let found = entry.is_some();
                self.record_outcome(pkg, &result, entry).await?;
                if !found {
                    return Err(ContentError::NoEntryPointFound);
                }
                self.get_package(pkg.id).await
            }
            Err(e) => {
                log::error!("Extraction failed for '{}': {e}", pkg.slug);
                package_repo::clear_extraction(
                    &self.pool,
                    pkg.id,
                    ExtractionStatus::Failed,
                    Some(&e.to_string()),
                )
                .await?;
                Err(e)
            }
        }
    }

    /// Run the engine and the entry point resolver on the blocking pool.
    ///
    /// On timeout the worker is cancelled and awaited before returning, so
    /// the caller's lock outlives every file operation. A worker that
    /// finished anyway has its result used.
    async fn run_extraction(
        &self,
        source_path: PathBuf,
        format: SourceFormat,
        file_name: String,
        pkg: ContentPackage,
    ) -> ContentResult<(ExtractionResult, Option<String>)> {
        let cancel = CancelFlag::new();
        let engine = self.engine.clone();
        let resolver = self.resolver.clone();
        let worker_cancel = cancel.clone();

        self.extractions_run.fetch_add(1, Ordering::SeqCst);
        let mut handle = tokio::task::spawn_blocking(move || {
            let result = if format.is_archive() {
                engine.extract(&source_path, pkg.kind, &pkg.slug, &worker_cancel)?
            } else {
                engine.materialize_standalone(&source_path, &file_name, pkg.kind, &pkg.slug)?
            };
            let entry = resolver.resolve(&result.root_path, pkg.kind);
            Ok::<_, ContentError>((result, entry))
        });

        let outcome = tokio::time::timeout(self.extraction_timeout, &mut handle).await;
        let joined = match outcome {
            Ok(joined) => joined,
            Err(_) => {
                cancel.cancel();
                log::warn!(
                    "Extraction exceeded {:?}, cancelling",
                    self.extraction_timeout
                );
                return match handle.await {
                    Ok(Ok(done)) => Ok(done),
                    _ => Err(ContentError::ExtractionIoFailure(format!(
                        "extraction timed out after {:?}",
                        self.extraction_timeout
                    ))),
                };
            }
        };

        joined.map_err(|e| {
            ContentError::ExtractionIoFailure(format!("extraction worker failed: {e}"))
        })?
    }

    async fn record_outcome(
        &self,
        pkg: &ContentPackage,
        result: &ExtractionResult,
        entry: Option<String>,
    ) -> ContentResult<()> {
        match entry {
            Some(entry) => {
                let now = chrono::Utc::now().to_rfc3339();
                package_repo::record_extraction(
                    &self.pool,
                    pkg.id,
                    &result.relative_root,
                    &entry,
                    &now,
                )
                .await?;
                log::info!(
                    "Package '{}' ready: {} files, entry point '{entry}'",
                    pkg.slug,
                    result.files_extracted
                );
            }
            None => {
                log::warn!("Package '{}' has no viewable entry point", pkg.slug);
                self.remove_extraction_dir(pkg).await?;
                package_repo::clear_extraction(
                    &self.pool,
                    pkg.id,
                    ExtractionStatus::NoEntryPoint,
                    Some(&ContentError::NoEntryPointFound.to_string()),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn remove_extraction_dir(&self, pkg: &ContentPackage) -> ContentResult<bool> {
        let engine = self.engine.clone();
        let (kind, slug) = (pkg.kind, pkg.slug.clone());
        blocking(move || engine.remove(kind, &slug)).await
    }
}

async fn blocking<T, F>(f: F) -> ContentResult<T>
where
    F: FnOnce() -> ContentResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        ContentError::ExtractionIoFailure(format!("blocking task failed: {e}"))
    })?
}

fn list_files(root: &Path) -> Vec<ExtractedFileInfo> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let path = to_slash_relative(root, e.path())?;
            let size = e.metadata().map(|m| m.len()).unwrap_or(0);
            Some(ExtractedFileInfo { path, size })
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
