//! Finding the document a package should open with.
//!
//! Resolution tries each strategy in order and stops at the first hit. The
//! candidate lists are plain data, so a new packaging convention is one more
//! [`CandidatePath`] in [`EntryPointResolver::strategies_for`].

use crate::database::models::PackageKind;
use crate::services::fs_utils::path_utils::to_slash_relative;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Depth of the fallback search below the extraction root.
pub const DEFAULT_SEARCH_DEPTH: usize = 6;

const WEBGL_CANDIDATES: &[&str] = &[
    "index.html",
    "Index.html",
    "Build/index.html",
    "build/index.html",
    "dist/index.html",
    "Dist/index.html",
];

const LMS_CANDIDATES: &[&str] = &[
    "index.html",
    "story.html",
    "index_lms.html",
    "scormdriver/indexAPI.html",
    "res/index.html",
    "launch.html",
    "start.html",
    "index_scorm.html",
];

/// One way of locating an entry document under an extraction root.
pub trait EntryStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Slash-separated path relative to `root`, if this strategy finds one.
    fn find(&self, root: &Path) -> Option<String>;
}

/// A fixed relative path that must exist as a regular file.
#[derive(Debug, Clone)]
pub struct CandidatePath(pub &'static str);

impl EntryStrategy for CandidatePath {
    fn name(&self) -> &str {
        self.0
    }

    fn find(&self, root: &Path) -> Option<String> {
        let candidate = root.join(self.0);
        is_regular_file(&candidate).then(|| self.0.to_string())
    }
}

/// Depth-first walk that lists a directory's files before its
/// subdirectories, each group in file-name order. The first `.html`/`.htm`
/// regular file wins.
#[derive(Debug, Clone)]
pub struct RecursiveHtmlSearch {
    pub max_depth: usize,
}

impl EntryStrategy for RecursiveHtmlSearch {
    fn name(&self) -> &str {
        "recursive html search"
    }

    fn find(&self, root: &Path) -> Option<String> {
        let mut matches = self.html_files(root);
        if matches.len() > 1 {
            log::warn!(
                "Entry point ambiguous under {}: {} HTML files, using '{}'",
                root.display(),
                matches.len(),
                matches[0]
            );
        }
        if matches.is_empty() {
            None
        } else {
            Some(matches.swap_remove(0))
        }
    }
}

impl RecursiveHtmlSearch {
    fn html_files(&self, root: &Path) -> Vec<String> {
        WalkDir::new(root)
            .min_depth(1)
            .max_depth(self.max_depth)
            .follow_links(false)
            .sort_by(|a, b| {
                a.file_type()
                    .is_dir()
                    .cmp(&b.file_type().is_dir())
                    .then_with(|| a.file_name().cmp(b.file_name()))
            })
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| has_html_extension(e.path()))
            .filter_map(|e| to_slash_relative(root, e.path()))
            .collect()
    }
}

pub struct EntryPointResolver {
    search_depth: usize,
}

impl Default for EntryPointResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_DEPTH)
    }
}

impl EntryPointResolver {
    pub fn new(search_depth: usize) -> Self {
        Self {
            search_depth: search_depth.max(1),
        }
    }

    /// Ordered strategies for a package kind: the kind's known locations,
    /// then the generic search.
    pub fn strategies_for(&self, kind: PackageKind) -> Vec<Box<dyn EntryStrategy>> {
        let candidates = match kind {
            PackageKind::Webgl => WEBGL_CANDIDATES,
            PackageKind::Lms => LMS_CANDIDATES,
        };
        let mut strategies: Vec<Box<dyn EntryStrategy>> = candidates
            .iter()
            .map(|path| Box::new(CandidatePath(path)) as Box<dyn EntryStrategy>)
            .collect();
        strategies.push(Box::new(RecursiveHtmlSearch {
            max_depth: self.search_depth,
        }));
        strategies
    }

    /// Entry document of an extracted package, relative to `root`.
    pub fn resolve(&self, root: &Path, kind: PackageKind) -> Option<String> {
        if !root.is_dir() {
            return None;
        }
        for strategy in self.strategies_for(kind) {
            if let Some(found) = strategy.find(root) {
                log::debug!("Entry point '{found}' found by '{}'", strategy.name());
                return Some(found);
            }
        }
        None
    }
}

fn is_regular_file(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_file())
        .unwrap_or(false)
}

fn has_html_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "tests/entry_point_tests.rs"]
mod tests;
