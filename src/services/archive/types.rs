use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What an uploaded source file is, judged by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    /// ZIP container (`.zip`, `.scorm`).
    Zip,
    /// A single directly-servable HTML document.
    Html,
    /// A single glTF / GLB model, wrapped in a generated viewer page.
    Model,
}

impl SourceFormat {
    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "zip" | "scorm" => Some(Self::Zip),
            "html" | "htm" => Some(Self::Html),
            "gltf" | "glb" => Some(Self::Model),
            _ => None,
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Zip)
    }
}

/// One entry as listed in the archive's central directory.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveEntryInfo {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub is_dir: bool,
}

/// Result of inspecting an archive without extracting it.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveAnalysis {
    pub file_count: usize,
    pub uncompressed_size: u64,
    pub single_root_folder: Option<String>,
    pub entries: Vec<ArchiveEntryInfo>,
    /// Entries that would abort extraction, with the reason.
    pub unsafe_entries: Vec<(String, &'static str)>,
}

impl ArchiveAnalysis {
    pub fn is_safe(&self) -> bool {
        self.unsafe_entries.is_empty()
    }
}

/// Result of a successful extraction.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// Absolute extraction root.
    pub root_path: PathBuf,
    /// Root relative to the media root, as persisted.
    pub relative_root: String,
    pub files_extracted: usize,
    pub bytes_written: u64,
}

/// Hard ceilings applied while unpacking, against zip bombs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionLimits {
    pub max_entries: usize,
    pub max_uncompressed_bytes: u64,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_entries: 50_000,
            max_uncompressed_bytes: 4 * 1024 * 1024 * 1024,
        }
    }
}

/// Cooperative cancellation shared between the coordinator and a blocking
/// extraction worker.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
