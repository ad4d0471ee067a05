use serde::Serialize;

/// Where a package stands between upload and serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageState {
    /// No source uploaded yet.
    NoArchive,
    /// Source attached, nothing servable on disk.
    NotExtracted,
    /// Extraction recorded and its directory present.
    Extracted,
    /// Extraction recorded but its directory is gone.
    Stale,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedFileInfo {
    /// Slash-separated, relative to the extraction root.
    pub path: String,
    pub size: u64,
}

/// Listing of an extracted package, for debugging uploads.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub package_id: i64,
    pub slug: String,
    pub state: PackageState,
    pub entry_point: Option<String>,
    pub entry_url: Option<String>,
    pub files: Vec<ExtractedFileInfo>,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Staging or retired directories removed.
    pub swept_leftovers: usize,
    /// Rows whose extraction directory had vanished.
    pub cleared_missing: usize,
    pub extracted: usize,
    pub failed: usize,
}
