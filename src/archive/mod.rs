//! Package tarball extraction.

mod tar_gz;

use crate::cleanup::SharedCleanupContext;
use crate::runtime::Runtime;
use anyhow::Result;
use std::path::Path;

pub use tar_gz::TarGzExtractor;

/// Trait for format-specific archive extractors
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor: Send + Sync {
    /// Check if this extractor can handle the given archive format
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// Extract the archive into `extract_to`, dropping a single top-level
    /// directory (`package/` in registry tarballs) if there is one.
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()>;

    /// Extract the archive with cleanup context for interruption handling
    fn extract_with_cleanup<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
        cleanup_ctx: SharedCleanupContext,
    ) -> Result<()>;
}
