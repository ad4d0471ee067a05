use serde::Serialize;
use thiserror::Error;

/// Every failure a package can hit between upload and the last served byte.
///
/// Admin surfaces see the specific variant (via [`ContentError::code`]);
/// end users only ever see "content unavailable".
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),
    #[error("Unsafe archive entry '{entry}': {reason}")]
    UnsafeArchiveEntry { entry: String, reason: &'static str },
    #[error("Extraction I/O failure: {0}")]
    ExtractionIoFailure(String),
    #[error("Extracted but no viewable entry point found")]
    NoEntryPointFound,
    #[error("Path traversal attempt: {0}")]
    PathTraversalAttempt(String),
    #[error("Package not found: {0}")]
    PackageNotFound(String),
    #[error("Package inactive: {0}")]
    PackageInactive(String),
    #[error("Access denied to package {0}")]
    AccessDenied(i64),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("No source file attached to package {0}")]
    NoSourceAttached(i64),
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),
    #[error("Package {0} is busy, try again later")]
    PackageBusy(i64),
    #[error("Database error: {0}")]
    Database(String),
}

impl ContentError {
    /// Stable taxonomy code for admin responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            ContentError::CorruptArchive(_) => "CORRUPT_ARCHIVE",
            ContentError::UnsafeArchiveEntry { .. } => "UNSAFE_ARCHIVE_ENTRY",
            ContentError::ExtractionIoFailure(_) => "EXTRACTION_IO_FAILURE",
            ContentError::NoEntryPointFound => "NO_ENTRY_POINT_FOUND",
            ContentError::PathTraversalAttempt(_) => "PATH_TRAVERSAL_ATTEMPT",
            ContentError::PackageNotFound(_) => "PACKAGE_NOT_FOUND",
            ContentError::PackageInactive(_) => "PACKAGE_INACTIVE",
            ContentError::AccessDenied(_) => "ACCESS_DENIED",
            ContentError::FileNotFound(_) => "FILE_NOT_FOUND",
            ContentError::NoSourceAttached(_) => "NO_SOURCE_ATTACHED",
            ContentError::InvalidUpload(_) => "INVALID_UPLOAD",
            ContentError::PackageBusy(_) => "PACKAGE_BUSY",
            ContentError::Database(_) => "DATABASE",
        }
    }

    /// Zip-slip and request-time escapes are logged as security events.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            ContentError::UnsafeArchiveEntry { .. } | ContentError::PathTraversalAttempt(_)
        )
    }

    /// Errors a rejected upload reports back to the admin flow.
    pub fn is_archive_rejection(&self) -> bool {
        matches!(
            self,
            ContentError::CorruptArchive(_)
                | ContentError::UnsafeArchiveEntry { .. }
                | ContentError::InvalidUpload(_)
        )
    }
}

impl From<sqlx::Error> for ContentError {
    fn from(error: sqlx::Error) -> Self {
        ContentError::Database(error.to_string())
    }
}

impl From<std::io::Error> for ContentError {
    fn from(error: std::io::Error) -> Self {
        ContentError::ExtractionIoFailure(error.to_string())
    }
}

impl From<zip::result::ZipError> for ContentError {
    fn from(error: zip::result::ZipError) -> Self {
        match error {
            zip::result::ZipError::Io(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::InvalidData
                ) =>
            {
                ContentError::CorruptArchive(e.to_string())
            }
            zip::result::ZipError::Io(e) => ContentError::ExtractionIoFailure(e.to_string()),
            other => ContentError::CorruptArchive(other.to_string()),
        }
    }
}

impl Serialize for ContentError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ContentError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type ContentResult<T> = Result<T, ContentError>;

#[cfg(test)]
#[path = "tests/errors_tests.rs"]
mod tests;
