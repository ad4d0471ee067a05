//! Read-only path from `(slug, relative path)` to a file on disk.
//!
//! Guards run in a fixed order and every failure is final:
//! 1. request path shape (`..`, absolute, backslash)
//! 2. package lookup, active flag, access policy
//! 3. extraction on demand
//! 4. canonical path must stay under the canonical extraction root
//! 5. target must be a regular file

use crate::database::models::ContentPackage;
use crate::services::content_type::{ContentDescriptor, ContentTypeResolver};
use crate::services::fs_utils::path_utils::check_request_path;
use crate::services::lifecycle::PackageLifecycleCoordinator;
use crate::types::errors::{ContentError, ContentResult};
use std::path::PathBuf;
use std::sync::Arc;

/// Decides whether a user may view a package. The user id comes from the
/// fronting auth layer and is absent for anonymous requests.
pub trait AccessPolicy: Send + Sync {
    fn can_access(&self, user_id: Option<&str>, package_id: i64) -> bool;
}

/// Every package is public.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_access(&self, _user_id: Option<&str>, _package_id: i64) -> bool {
        true
    }
}

/// A file cleared for serving.
#[derive(Debug, Clone)]
pub struct ServedFile {
    /// Canonical path, inside the extraction root.
    pub path: PathBuf,
    pub size: u64,
    pub descriptor: ContentDescriptor,
}

pub struct SecureFileGateway {
    coordinator: Arc<PackageLifecycleCoordinator>,
    policy: Arc<dyn AccessPolicy>,
}

impl SecureFileGateway {
    pub fn new(
        coordinator: Arc<PackageLifecycleCoordinator>,
        policy: Arc<dyn AccessPolicy>,
    ) -> Self {
        Self {
            coordinator,
            policy,
        }
    }

    pub fn coordinator(&self) -> &Arc<PackageLifecycleCoordinator> {
        &self.coordinator
    }

    pub async fn resolve(
        &self,
        slug: &str,
        requested: &str,
        user_id: Option<&str>,
    ) -> ContentResult<ServedFile> {
        if let Err(rejection) = check_request_path(requested) {
            log::warn!(
                target: "security",
                "Rejected path {requested:?} for '{slug}': {}",
                rejection.reason()
            );
            return Err(ContentError::PathTraversalAttempt(requested.to_string()));
        }

        let pkg = self.authorize(slug, user_id).await?;
        let pkg = self.coordinator.ensure_extracted(pkg.id).await?;
        let (root, _) = pkg.extraction().ok_or(ContentError::NoEntryPointFound)?;
        let root = self.coordinator.engine().absolute_root(root)?;

        let canonical_root = tokio::fs::canonicalize(&root)
            .await
            .map_err(|_| ContentError::FileNotFound(slug.to_string()))?;
        let canonical = tokio::fs::canonicalize(root.join(requested))
            .await
            .map_err(|_| ContentError::FileNotFound(requested.to_string()))?;

        if !canonical.starts_with(&canonical_root) {
            log::warn!(
                target: "security",
                "Path {requested:?} for '{slug}' resolved outside its root to {}",
                canonical.display()
            );
            return Err(ContentError::PathTraversalAttempt(requested.to_string()));
        }

        let meta = tokio::fs::metadata(&canonical)
            .await
            .map_err(|_| ContentError::FileNotFound(requested.to_string()))?;
        if !meta.is_file() {
            return Err(ContentError::FileNotFound(requested.to_string()));
        }

        Ok(ServedFile {
            descriptor: ContentTypeResolver::resolve(requested),
            size: meta.len(),
            path: canonical,
        })
    }

    /// Public URL of the package's entry document.
    pub async fn entry_redirect(&self, slug: &str, user_id: Option<&str>) -> ContentResult<String> {
        let pkg = self.authorize(slug, user_id).await?;
        let pkg = self.coordinator.ensure_extracted(pkg.id).await?;
        pkg.entry_url().ok_or(ContentError::NoEntryPointFound)
    }

    async fn authorize(&self, slug: &str, user_id: Option<&str>) -> ContentResult<ContentPackage> {
        let pkg = self
            .coordinator
            .get_package_by_slug(slug)
            .await?
            .ok_or_else(|| ContentError::PackageNotFound(slug.to_string()))?;
        if !pkg.active {
            return Err(ContentError::PackageInactive(slug.to_string()));
        }
        if !self.policy.can_access(user_id, pkg.id) {
            log::info!("Access to '{slug}' denied for user {user_id:?}");
            return Err(ContentError::AccessDenied(pkg.id));
        }
        Ok(pkg)
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
