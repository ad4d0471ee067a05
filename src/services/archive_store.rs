//! Raw upload storage.
//!
//! Every accepted upload is kept under `<media_root>/archives/<kind>/<slug>/`
//! with a unique prefix, so a replacement never overwrites the source the
//! current extraction came from until the swap has succeeded.

use crate::database::models::PackageKind;
use crate::services::archive::SourceFormat;
use crate::services::fs_utils::file_utils::{remove_dir_if_exists, write_file_atomically};
use crate::services::fs_utils::path_utils::resolve_under;
use crate::types::errors::{ContentError, ContentResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const ARCHIVES_DIR: &str = "archives";

/// A source file written to the store.
#[derive(Debug, Clone)]
pub struct StoredSource {
    /// Reference relative to the store root, persisted on the package row.
    pub reference: String,
    pub format: SourceFormat,
    /// BLAKE3 hex digest of the raw bytes.
    pub digest: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    pub fn new(media_root: &Path) -> Self {
        Self {
            root: media_root.join(ARCHIVES_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check an upload against the kind's accepted extensions before anything
    /// is written.
    pub fn validate_upload(
        kind: PackageKind,
        file_name: &str,
        bytes: &[u8],
        max_bytes: u64,
    ) -> ContentResult<SourceFormat> {
        if bytes.is_empty() {
            return Err(ContentError::InvalidUpload("uploaded file is empty".to_string()));
        }
        if bytes.len() as u64 > max_bytes {
            return Err(ContentError::InvalidUpload(format!(
                "upload is {} bytes, limit is {max_bytes}",
                bytes.len()
            )));
        }

        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if !kind.accepted_extensions().contains(&ext.as_str()) {
            return Err(ContentError::InvalidUpload(format!(
                "'{file_name}' is not accepted for {kind} packages (allowed: {})",
                kind.accepted_extensions().join(", ")
            )));
        }

        SourceFormat::from_path(Path::new(file_name)).ok_or_else(|| {
            ContentError::InvalidUpload(format!("unrecognized file type '{file_name}'"))
        })
    }

    /// Write a new source for the package. Earlier sources are left alone.
    pub fn store(
        &self,
        kind: PackageKind,
        slug: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> ContentResult<StoredSource> {
        let format = SourceFormat::from_path(Path::new(file_name)).ok_or_else(|| {
            ContentError::InvalidUpload(format!("unrecognized file type '{file_name}'"))
        })?;
        let safe_name = sanitize_filename::sanitize(file_name);
        if safe_name.is_empty() {
            return Err(ContentError::InvalidUpload(format!(
                "unusable file name '{file_name}'"
            )));
        }

        let reference = format!("{kind}/{slug}/{}-{safe_name}", uuid::Uuid::new_v4());
        let path = self.path(&reference)?;
        write_file_atomically(&path, bytes).map_err(|e| {
            ContentError::ExtractionIoFailure(format!("Failed to store upload: {e}"))
        })?;

        log::info!("Stored {} bytes for '{slug}' as {reference}", bytes.len());

        Ok(StoredSource {
            reference,
            format,
            digest: blake3::hash(bytes).to_hex().to_string(),
            size: bytes.len() as u64,
        })
    }

    /// Absolute path of a stored reference. References that would leave the
    /// store root are refused.
    pub fn path(&self, reference: &str) -> ContentResult<PathBuf> {
        resolve_under(&self.root, reference).ok_or_else(|| {
            ContentError::PathTraversalAttempt(format!("source reference '{reference}'"))
        })
    }

    /// Delete one stored source. Missing files are not an error.
    pub fn remove(&self, reference: &str) -> ContentResult<()> {
        let path = self.path(reference)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ContentError::ExtractionIoFailure(format!(
                    "Failed to remove {}: {e}",
                    path.display()
                )))
            }
        }
        if let Some(parent) = path.parent() {
            // Only succeeds when empty.
            let _ = fs::remove_dir(parent);
        }
        Ok(())
    }

    /// Delete every stored source of a package.
    pub fn remove_package(&self, kind: PackageKind, slug: &str) -> ContentResult<bool> {
        let dir = self.root.join(kind.to_string()).join(slug);
        remove_dir_if_exists(&dir).map_err(|e| {
            ContentError::ExtractionIoFailure(format!("Failed to remove {}: {e}", dir.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_upload_per_kind() {
        let max = 1024;
        assert_eq!(
            ArchiveStore::validate_upload(PackageKind::Webgl, "game.zip", b"PK", max).unwrap(),
            SourceFormat::Zip
        );
        assert_eq!(
            ArchiveStore::validate_upload(PackageKind::Webgl, "robot.GLB", b"x", max).unwrap(),
            SourceFormat::Model
        );
        assert_eq!(
            ArchiveStore::validate_upload(PackageKind::Lms, "course.scorm", b"PK", max).unwrap(),
            SourceFormat::Zip
        );
        assert!(ArchiveStore::validate_upload(PackageKind::Lms, "robot.glb", b"x", max).is_err());
        assert!(ArchiveStore::validate_upload(PackageKind::Webgl, "notes.txt", b"x", max).is_err());
        assert!(ArchiveStore::validate_upload(PackageKind::Webgl, "game.zip", b"", max).is_err());
        assert!(
            ArchiveStore::validate_upload(PackageKind::Webgl, "game.zip", &[0u8; 2048], max)
                .is_err()
        );
    }

    #[test]
    fn test_store_and_remove() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(dir.path());

        let stored = store
            .store(PackageKind::Webgl, "space", "Space Game.zip", b"zip-bytes")
            .unwrap();
        assert!(stored.reference.starts_with("webgl/space/"));
        assert_eq!(stored.size, 9);
        assert_eq!(stored.digest, blake3::hash(b"zip-bytes").to_hex().to_string());
        assert!(stored.reference.ends_with("-Space Game.zip"));

        let path = store.path(&stored.reference).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"zip-bytes");

        store.remove(&stored.reference).unwrap();
        assert!(!path.exists());
        // Second removal is a no-op.
        store.remove(&stored.reference).unwrap();
    }

    #[test]
    fn test_each_upload_gets_its_own_reference() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(dir.path());
        let a = store.store(PackageKind::Lms, "c", "course.zip", b"a").unwrap();
        let b = store.store(PackageKind::Lms, "c", "course.zip", b"b").unwrap();
        assert_ne!(a.reference, b.reference);

        assert!(store.remove_package(PackageKind::Lms, "c").unwrap());
        assert!(!store.path(&a.reference).unwrap().exists());
    }

    #[test]
    fn test_path_rejects_escape() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(dir.path());
        assert!(matches!(
            store.path("../../etc/passwd"),
            Err(ContentError::PathTraversalAttempt(_))
        ));
    }
}
