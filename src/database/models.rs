use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]{0,127}$").expect("valid slug regex"));

/// Slugs become directory names and URL segments: lowercase ASCII, digits,
/// `-` and `_`, starting with a letter or digit.
pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_RE.is_match(slug)
}

/// Runtime family of a content package.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PackageKind {
    Webgl,
    Lms,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageKind::Webgl => write!(f, "webgl"),
            PackageKind::Lms => write!(f, "lms"),
        }
    }
}

impl FromStr for PackageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "webgl" => Ok(PackageKind::Webgl),
            "lms" | "scorm" => Ok(PackageKind::Lms),
            _ => Err(format!("Unknown package kind: {s}")),
        }
    }
}

impl PackageKind {
    /// Directory under the media root that holds this kind's extractions.
    pub fn extraction_dir_name(&self) -> &'static str {
        match self {
            PackageKind::Webgl => "webgl_extracted",
            PackageKind::Lms => "lms_extracted",
        }
    }

    /// Upload extensions accepted for this kind (lowercase, no dot).
    pub fn accepted_extensions(&self) -> &'static [&'static str] {
        match self {
            PackageKind::Webgl => &["zip", "html", "htm", "gltf", "glb"],
            PackageKind::Lms => &["zip", "scorm", "html", "htm"],
        }
    }
}

/// Outcome of the last extraction attempt, persisted on the row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ExtractionStatus {
    NotExtracted,
    Extracted,
    NoEntryPoint,
    Failed,
}

/// Row of the `content_packages` table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContentPackage {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub kind: PackageKind,
    pub source_archive_ref: Option<String>,
    pub standalone_file_ref: Option<String>,
    pub source_file_name: Option<String>,
    pub source_digest: Option<String>,
    pub source_size: Option<i64>,
    /// Relative to the media root, e.g. `webgl_extracted/demo_my-demo`.
    pub extracted_root_path: Option<String>,
    pub entry_point_relative_path: Option<String>,
    pub extraction_status: ExtractionStatus,
    pub last_error: Option<String>,
    pub last_extracted_at: Option<String>,
    pub active: bool,
}

impl ContentPackage {
    /// Stored reference of whichever source is attached.
    pub fn source_ref(&self) -> Option<&str> {
        self.source_archive_ref
            .as_deref()
            .or(self.standalone_file_ref.as_deref())
    }

    pub fn has_source(&self) -> bool {
        self.source_ref().is_some()
    }

    /// Recorded extraction: root and entry point, which are always set together.
    pub fn extraction(&self) -> Option<(&str, &str)> {
        match (
            self.extracted_root_path.as_deref(),
            self.entry_point_relative_path.as_deref(),
        ) {
            (Some(root), Some(entry)) => Some((root, entry)),
            _ => None,
        }
    }

    /// Public URL of the entry document, if the package has one.
    pub fn entry_url(&self) -> Option<String> {
        let (_, entry) = self.extraction()?;
        let encoded: Vec<String> = entry
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        Some(format!("/content/{}/{}", self.slug, encoded.join("/")))
    }
}

/// Fields supplied when the owning demo record is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPackage {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    pub kind: PackageKind,
}

/// Source bookkeeping written when a new upload is accepted.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub archive_ref: Option<String>,
    pub standalone_ref: Option<String>,
    pub file_name: String,
    pub digest: String,
    pub size: i64,
}
