use super::analyze::entry_rejection;
use super::types::{CancelFlag, ExtractionLimits, ExtractionResult, SourceFormat};
use crate::database::models::{is_valid_slug, PackageKind};
use crate::services::fs_utils::file_utils::{remove_dir_if_exists, swap_dir_into_place};
use crate::services::fs_utils::path_utils::{resolve_under, sanitize_entry_name, PathRejection};
use crate::types::errors::{ContentError, ContentResult};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

const STAGING_PREFIX: &str = ".staging-";
const RETIRED_PREFIX: &str = ".retired-";
const COPY_CHUNK: usize = 64 * 1024;
/// Free space required on top of the declared uncompressed size.
const DISK_HEADROOM: u64 = 50 * 1024 * 1024;

/// Unpacks uploads into `<media_root>/<kind>_extracted/demo_<slug>`.
///
/// The only component allowed to create or delete package directories.
/// Every extraction is staged next to its destination and renamed into
/// place only after the last byte is written, so a failure at any point
/// leaves the previous directory (or nothing) behind.
#[derive(Debug, Clone)]
pub struct ExtractionEngine {
    media_root: PathBuf,
    limits: ExtractionLimits,
}

impl ExtractionEngine {
    pub fn new(media_root: impl Into<PathBuf>, limits: ExtractionLimits) -> Self {
        Self {
            media_root: media_root.into(),
            limits,
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Extraction root relative to the media root, as persisted on the row.
    pub fn relative_root(kind: PackageKind, slug: &str) -> String {
        format!("{}/demo_{slug}", kind.extraction_dir_name())
    }

    pub fn destination(&self, kind: PackageKind, slug: &str) -> ContentResult<PathBuf> {
        if !is_valid_slug(slug) {
            return Err(ContentError::InvalidUpload(format!("invalid slug '{slug}'")));
        }
        Ok(self
            .media_root
            .join(kind.extraction_dir_name())
            .join(format!("demo_{slug}")))
    }

    /// Turn a persisted relative root back into an absolute path, refusing
    /// anything that would leave the media root.
    pub fn absolute_root(&self, stored: &str) -> ContentResult<PathBuf> {
        resolve_under(&self.media_root, stored).ok_or_else(|| {
            ContentError::PathTraversalAttempt(format!("stored root '{stored}' escapes media root"))
        })
    }

    /// Extract a ZIP archive for the given package.
    ///
    /// Steps:
    /// 1. Validate every entry name and mode (zip-slip, symlinks) and the
    ///    declared sizes before writing anything
    /// 2. Check free disk space
    /// 3. Unpack into a staging directory, enforcing the byte budget
    /// 4. Swap the staging directory into place
    pub fn extract(
        &self,
        archive_path: &Path,
        kind: PackageKind,
        slug: &str,
        cancel: &CancelFlag,
    ) -> ContentResult<ExtractionResult> {
        let dest = self.destination(kind, slug)?;

        let file = fs::File::open(archive_path).map_err(|e| {
            ContentError::ExtractionIoFailure(format!("Failed to open archive: {e}"))
        })?;
        let mut archive = zip::ZipArchive::new(file)?;

        if archive.len() > self.limits.max_entries {
            return Err(ContentError::CorruptArchive(format!(
                "archive has {} entries, limit is {}",
                archive.len(),
                self.limits.max_entries
            )));
        }

        let mut declared: u64 = 0;
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            if let Some(reason) = entry_rejection(entry.name(), entry.unix_mode(), entry.is_dir())
            {
                log::warn!(
                    target: "security",
                    "Zip-slip guard rejected archive for '{slug}': entry '{}' ({reason})",
                    entry.name()
                );
                return Err(ContentError::UnsafeArchiveEntry {
                    entry: entry.name().to_string(),
                    reason,
                });
            }
            declared = declared.saturating_add(entry.size());
        }

        if declared > self.limits.max_uncompressed_bytes {
            return Err(ContentError::CorruptArchive(format!(
                "archive declares {declared} uncompressed bytes, limit is {}",
                self.limits.max_uncompressed_bytes
            )));
        }
        self.check_disk_space(declared)?;

        let staging = self.staging_dir(&dest)?;
        let (files_extracted, bytes_written) = self.unpack_into(&mut archive, staging.path(), cancel)?;

        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        self.commit(staging, &dest)?;

        log::info!(
            "Extracted {files_extracted} files ({bytes_written} bytes) for '{slug}' into {}",
            dest.display()
        );

        Ok(ExtractionResult {
            root_path: dest,
            relative_root: Self::relative_root(kind, slug),
            files_extracted,
            bytes_written,
        })
    }

    /// Place a standalone HTML document or 3D model into the package
    /// directory, through the same staging path as archives. Models get a
    /// generated `index.html` viewer page next to them.
    pub fn materialize_standalone(
        &self,
        source_path: &Path,
        file_name: &str,
        kind: PackageKind,
        slug: &str,
    ) -> ContentResult<ExtractionResult> {
        let dest = self.destination(kind, slug)?;
        let format = SourceFormat::from_path(Path::new(file_name)).ok_or_else(|| {
            ContentError::InvalidUpload(format!("unsupported standalone file '{file_name}'"))
        })?;
        if format.is_archive() {
            return Err(ContentError::InvalidUpload(format!(
                "'{file_name}' is an archive, not a standalone file"
            )));
        }

        let safe_name = sanitize_filename::sanitize(file_name);
        if safe_name.is_empty() || safe_name.starts_with('.') {
            return Err(ContentError::InvalidUpload(format!(
                "unusable file name '{file_name}'"
            )));
        }

        let staging = self.staging_dir(&dest)?;
        let mut bytes_written = fs::copy(source_path, staging.path().join(&safe_name))
            .map_err(|e| ContentError::ExtractionIoFailure(format!("Failed to copy file: {e}")))?;
        let mut files_extracted = 1;

        if format == SourceFormat::Model && !safe_name.eq_ignore_ascii_case("index.html") {
            let page = model_viewer_page(&safe_name);
            fs::write(staging.path().join("index.html"), page.as_bytes()).map_err(|e| {
                ContentError::ExtractionIoFailure(format!("Failed to write viewer page: {e}"))
            })?;
            bytes_written += page.len() as u64;
            files_extracted += 1;
        }

        self.commit(staging, &dest)?;

        Ok(ExtractionResult {
            root_path: dest,
            relative_root: Self::relative_root(kind, slug),
            files_extracted,
            bytes_written,
        })
    }

    /// Delete a package's extraction directory. Returns whether it existed.
    pub fn remove(&self, kind: PackageKind, slug: &str) -> ContentResult<bool> {
        let dest = self.destination(kind, slug)?;
        let removed = remove_dir_if_exists(&dest).map_err(|e| {
            ContentError::ExtractionIoFailure(format!("Failed to remove {}: {e}", dest.display()))
        })?;
        if removed {
            log::info!("Removed extraction directory {}", dest.display());
        }
        Ok(removed)
    }

    /// Remove staging and retired directories left behind by a crash.
    pub fn sweep_leftovers(&self) -> usize {
        let mut swept = 0;
        for kind in [PackageKind::Webgl, PackageKind::Lms] {
            let kind_dir = self.media_root.join(kind.extraction_dir_name());
            let Ok(entries) = fs::read_dir(&kind_dir) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name().to_string_lossy().to_string();
                if !(name.starts_with(STAGING_PREFIX) || name.starts_with(RETIRED_PREFIX)) {
                    continue;
                }
                match fs::remove_dir_all(entry.path()) {
                    Ok(()) => swept += 1,
                    Err(e) => log::warn!("Failed to sweep {}: {e}", entry.path().display()),
                }
            }
        }
        swept
    }

    fn staging_dir(&self, dest: &Path) -> ContentResult<tempfile::TempDir> {
        let kind_dir = dest.parent().ok_or_else(|| {
            ContentError::ExtractionIoFailure("destination has no parent".to_string())
        })?;
        fs::create_dir_all(kind_dir).map_err(|e| {
            ContentError::ExtractionIoFailure(format!("Failed to create {}: {e}", kind_dir.display()))
        })?;
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(kind_dir)
            .map_err(|e| ContentError::ExtractionIoFailure(format!("Failed to create staging dir: {e}")))
    }

    fn commit(&self, staging: tempfile::TempDir, dest: &Path) -> ContentResult<()> {
        let staged = staging.keep();
        swap_dir_into_place(&staged, dest).map_err(|e| {
            let _ = fs::remove_dir_all(&staged);
            ContentError::ExtractionIoFailure(format!(
                "Failed to move extraction into {}: {e}",
                dest.display()
            ))
        })
    }

    fn unpack_into<R: Read + io::Seek>(
        &self,
        archive: &mut zip::ZipArchive<R>,
        staging: &Path,
        cancel: &CancelFlag,
    ) -> ContentResult<(usize, u64)> {
        let mut budget = self.limits.max_uncompressed_bytes;
        let mut buf = vec![0u8; COPY_CHUNK];
        let mut files: usize = 0;
        let mut bytes: u64 = 0;

        for i in 0..archive.len() {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }

            let mut entry = archive.by_index(i)?;
            let relative = match sanitize_entry_name(entry.name()) {
                Ok(p) => p,
                Err(PathRejection::Empty) if entry.is_dir() => continue,
                Err(rejection) => {
                    return Err(ContentError::UnsafeArchiveEntry {
                        entry: entry.name().to_string(),
                        reason: rejection.reason(),
                    })
                }
            };
            let output_path = staging.join(&relative);

            if entry.is_dir() {
                fs::create_dir_all(&output_path).map_err(|e| {
                    ContentError::ExtractionIoFailure(format!("Failed to create dir: {e}"))
                })?;
                continue;
            }

            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    ContentError::ExtractionIoFailure(format!("Failed to create parent: {e}"))
                })?;
            }
            let mut outfile = fs::File::create(&output_path).map_err(|e| {
                ContentError::ExtractionIoFailure(format!("Failed to create file: {e}"))
            })?;
            bytes += copy_chunked(&mut entry, &mut outfile, &mut buf, &mut budget, cancel)?;
            files += 1;
        }

        Ok((files, bytes))
    }

    /// Pre-extract disk space check: declared size plus headroom must fit on
    /// the disk holding the media root.
    fn check_disk_space(&self, declared: u64) -> ContentResult<()> {
        let required_space = declared.saturating_add(DISK_HEADROOM);

        let disks = sysinfo::Disks::new_with_refreshed_list();
        let search_path = self
            .media_root
            .canonicalize()
            .unwrap_or_else(|_| self.media_root.clone());

        let mut available_space = 0;
        let mut matched_len = 0;
        for disk in disks.list() {
            let mount = disk.mount_point();
            if search_path.starts_with(mount) {
                let mount_len = mount.as_os_str().len();
                if mount_len > matched_len {
                    matched_len = mount_len;
                    available_space = disk.available_space();
                }
            }
        }

        if matched_len > 0 && available_space < required_space {
            return Err(ContentError::ExtractionIoFailure(format!(
                "Insufficient disk space. Requires {required_space} bytes, but only {available_space} bytes available."
            )));
        }
        Ok(())
    }
}

fn copy_chunked<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
    budget: &mut u64,
    cancel: &CancelFlag,
) -> ContentResult<u64> {
    let mut total: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let n = match reader.read(buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(ContentError::CorruptArchive(format!(
                    "Failed to read entry data: {e}"
                )))
            }
        };
        if n as u64 > *budget {
            return Err(ContentError::CorruptArchive(
                "archive expands beyond the uncompressed size limit".to_string(),
            ));
        }
        *budget -= n as u64;
        writer
            .write_all(&buf[..n])
            .map_err(|e| ContentError::ExtractionIoFailure(format!("Failed to write file: {e}")))?;
        total += n as u64;
    }
    Ok(total)
}

fn cancelled() -> ContentError {
    ContentError::ExtractionIoFailure("extraction cancelled".to_string())
}

fn model_viewer_page(model_file: &str) -> String {
    let title = escape_html(model_file);
    let src = urlencoding::encode(model_file);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<script type="module" src="https://unpkg.com/@google/model-viewer/dist/model-viewer.min.js"></script>
<style>html, body {{ margin: 0; height: 100%; }} model-viewer {{ width: 100%; height: 100%; }}</style>
</head>
<body>
<model-viewer src="{src}" alt="{title}" auto-rotate camera-controls shadow-intensity="1" ar></model-viewer>
</body>
</html>
"#
    )
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
