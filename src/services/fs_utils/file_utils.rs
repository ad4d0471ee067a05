use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Moves a fully-populated `staged` directory to `dest`, replacing any
/// existing `dest` as a whole.
///
/// The old directory is first renamed aside, so readers observe either the
/// complete old tree or the complete new one. If the final rename fails the
/// old tree is put back. Both paths must live on the same filesystem.
pub fn swap_dir_into_place(staged: &Path, dest: &Path) -> io::Result<()> {
    let retired = if dest.exists() {
        let aside = retired_sibling(dest)?;
        fs::rename(dest, &aside)?;
        Some(aside)
    } else {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        None
    };

    if let Err(e) = fs::rename(staged, dest) {
        if let Some(aside) = &retired {
            if let Err(restore_err) = fs::rename(aside, dest) {
                log::error!(
                    "Failed to restore {} after aborted swap: {restore_err}",
                    dest.display()
                );
            }
        }
        return Err(e);
    }

    if let Some(aside) = retired {
        if let Err(e) = fs::remove_dir_all(&aside) {
            log::warn!("Failed to remove retired directory {}: {e}", aside.display());
        }
    }
    Ok(())
}

/// Remove a directory tree if present. Returns whether anything was removed.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Write `bytes` to `dest` through a temp file in the same directory, so a
/// crash never leaves a truncated file under the final name.
pub fn write_file_atomically(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"))?;
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

fn retired_sibling(dest: &Path) -> io::Result<PathBuf> {
    let parent = dest
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"))?;
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(parent.join(format!(".retired-{name}-{}", uuid::Uuid::new_v4())))
}
