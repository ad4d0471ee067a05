use super::types::{ArchiveAnalysis, ArchiveEntryInfo};
use crate::services::fs_utils::path_utils::{sanitize_entry_name, PathRejection};
use crate::types::errors::ContentResult;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Inspect a ZIP archive without writing anything to disk.
///
/// Lists every entry and flags the ones extraction would refuse, so an
/// upload can be rejected synchronously even when extraction is deferred.
pub fn analyze_archive(archive_path: &Path) -> ContentResult<ArchiveAnalysis> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut uncompressed_size: u64 = 0;
    let mut root_dirs: HashSet<String> = HashSet::new();
    let mut entries = Vec::with_capacity(archive.len());
    let mut unsafe_entries = Vec::new();
    let mut file_count = 0;

    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        let name = entry.name().to_string();

        if let Some(reason) = entry_rejection(&name, entry.unix_mode(), entry.is_dir()) {
            unsafe_entries.push((name.clone(), reason));
        }

        uncompressed_size = uncompressed_size.saturating_add(entry.size());
        if !entry.is_dir() {
            file_count += 1;
        }

        let normalized = name.replace('\\', "/");
        if let Some(first) = normalized.split('/').find(|s| !s.is_empty()) {
            root_dirs.insert(first.to_string());
        }

        entries.push(ArchiveEntryInfo {
            name,
            size: entry.size(),
            compressed_size: entry.compressed_size(),
            is_dir: entry.is_dir(),
        });
    }

    // A single root only counts as a wrapper folder if something is nested in it.
    let single_root_folder = if root_dirs.len() == 1 {
        root_dirs
            .into_iter()
            .next()
            .filter(|root| entries.iter().any(|e| e.name.len() > root.len() + 1))
    } else {
        None
    };

    Ok(ArchiveAnalysis {
        file_count,
        uncompressed_size,
        single_root_folder,
        entries,
        unsafe_entries,
    })
}

/// Reason an entry must not be extracted, if any.
///
/// A directory entry that normalizes to nothing (`./`) is harmless and skipped.
pub(crate) fn entry_rejection(
    name: &str,
    unix_mode: Option<u32>,
    is_dir: bool,
) -> Option<&'static str> {
    if is_symlink_mode(unix_mode) {
        return Some("symlink entry");
    }
    match sanitize_entry_name(name) {
        Ok(_) => None,
        Err(PathRejection::Empty) if is_dir => None,
        Err(rejection) => Some(rejection.reason()),
    }
}

pub(crate) fn is_symlink_mode(unix_mode: Option<u32>) -> bool {
    const S_IFMT: u32 = 0o170000;
    const S_IFLNK: u32 = 0o120000;
    unix_mode.is_some_and(|mode| mode & S_IFMT == S_IFLNK)
}
