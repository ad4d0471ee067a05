use std::path::{Component, Path, PathBuf};

/// Why a path string was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRejection {
    Empty,
    ParentSegment,
    Absolute,
    Backslash,
    NulByte,
    DrivePrefix,
}

impl PathRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            PathRejection::Empty => "empty path",
            PathRejection::ParentSegment => "parent directory segment",
            PathRejection::Absolute => "absolute path",
            PathRejection::Backslash => "backslash separator",
            PathRejection::NulByte => "NUL byte",
            PathRejection::DrivePrefix => "drive or scheme prefix",
        }
    }
}

/// Validate a path requested over HTTP, relative to an extraction root.
///
/// Fail-closed string check done before touching the filesystem: any `..`,
/// a leading `/`, any `\`, NUL bytes and `C:`-style prefixes are refused.
pub fn check_request_path(requested: &str) -> Result<(), PathRejection> {
    if requested.is_empty() {
        return Err(PathRejection::Empty);
    }
    if requested.contains('\0') {
        return Err(PathRejection::NulByte);
    }
    if requested.contains("..") {
        return Err(PathRejection::ParentSegment);
    }
    if requested.starts_with('/') {
        return Err(PathRejection::Absolute);
    }
    if requested.contains('\\') {
        return Err(PathRejection::Backslash);
    }
    if has_drive_prefix(requested) {
        return Err(PathRejection::DrivePrefix);
    }
    Ok(())
}

/// Validate a raw archive entry name and turn it into a relative path.
///
/// Entry names use `/` but hostile archives also use `\`, so both count as
/// separators. `.` segments and empty segments are dropped.
pub fn sanitize_entry_name(name: &str) -> Result<PathBuf, PathRejection> {
    if name.contains('\0') {
        return Err(PathRejection::NulByte);
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(PathRejection::Absolute);
    }
    if has_drive_prefix(name) {
        return Err(PathRejection::DrivePrefix);
    }

    let mut relative = PathBuf::new();
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(PathRejection::ParentSegment),
            s => relative.push(s),
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(PathRejection::Empty);
    }
    // Belt and braces: the rebuilt path must be purely normal components.
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(PathRejection::Absolute);
    }
    Ok(relative)
}

/// Validates that a stored relative path (e.g. an extraction root recorded in
/// the database) stays inside `base_path`, and joins it.
pub fn resolve_under(base_path: &Path, stored: &str) -> Option<PathBuf> {
    let relative = Path::new(stored);
    if relative.as_os_str().is_empty() {
        return None;
    }
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(base_path.join(relative))
}

/// Render a path relative to `root` with `/` separators.
pub fn to_slash_relative(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn has_drive_prefix(value: &str) -> bool {
    let first = value.split(['/', '\\']).next().unwrap_or("");
    first.contains(':')
}

#[cfg(test)]
#[path = "tests/path_utils_tests.rs"]
mod tests;
