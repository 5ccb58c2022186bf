use crate::cleanup::{self, SharedCleanupContext};
use crate::error::PackageError;
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::{debug, info};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

use super::ArchiveExtractor;

/// Extractor for gzip-compressed tarballs (`.tgz`, `.tar.gz`).
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".tgz") || name.ends_with(".tar.gz")
    }

    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        self.extract_impl(runtime, archive_path, extract_to, None)
    }

    fn extract_with_cleanup<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
        cleanup_ctx: SharedCleanupContext,
    ) -> Result<()> {
        self.extract_impl(runtime, archive_path, extract_to, Some(cleanup_ctx))
    }
}

/// Entry path relative to the extraction root, or `None` if it would escape.
fn safe_entry_path(path: &Path) -> Option<PathBuf> {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => result.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if result.as_os_str().is_empty() {
        None
    } else {
        Some(result)
    }
}

impl TarGzExtractor {
    #[tracing::instrument(skip(self, runtime, cleanup_ctx))]
    fn extract_impl<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
        cleanup_ctx: Option<SharedCleanupContext>,
    ) -> Result<()> {
        debug!("Extracting tarball to {:?}...", extract_to);
        let file = runtime
            .open(archive_path)
            .map_err(|e| e.context(PackageError::archive(format!("cannot open {:?}", archive_path))))?;

        let mut archive = Archive::new(GzDecoder::new(file));

        // Unpack next to the destination first so a single top-level
        // directory can be flattened away afterwards.
        let dir_name = extract_to
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                PackageError::filesystem(format!("invalid extraction target {:?}", extract_to))
            })?;
        let temp_extract_dir = extract_to.with_file_name(format!("{}_temp_extract", dir_name));
        if runtime.exists(&temp_extract_dir) {
            runtime.remove_dir_all(&temp_extract_dir)?;
        }
        runtime.create_dir_all(&temp_extract_dir)?;

        if let Some(ref ctx) = cleanup_ctx {
            cleanup::lock(ctx).add(temp_extract_dir.clone());
        }

        let result = self
            .unpack_entries(runtime, &mut archive, archive_path, &temp_extract_dir)
            .and_then(|()| flatten_into(runtime, &temp_extract_dir, extract_to));

        if runtime.exists(&temp_extract_dir) {
            runtime.remove_dir_all(&temp_extract_dir)?;
        }
        if let Some(ref ctx) = cleanup_ctx {
            cleanup::lock(ctx).remove(&temp_extract_dir);
        }

        result?;
        info!("Extraction complete.");
        Ok(())
    }

    fn unpack_entries<R: Runtime + 'static, T: std::io::Read>(
        &self,
        runtime: &R,
        archive: &mut Archive<T>,
        archive_path: &Path,
        temp_extract_dir: &Path,
    ) -> Result<()> {
        let corrupt = |e: std::io::Error| {
            anyhow::Error::new(e).context(PackageError::archive(format!(
                "corrupt tarball {:?}",
                archive_path
            )))
        };

        let mut count = 0usize;
        for entry in archive.entries().map_err(corrupt)? {
            let mut entry = entry.map_err(corrupt)?;
            let raw_path = entry.path().map_err(corrupt)?.into_owned();

            let Some(entry_path) = safe_entry_path(&raw_path) else {
                return Err(PackageError::archive(format!(
                    "entry {:?} escapes the extraction directory",
                    raw_path
                ))
                .into());
            };
            let full_path = temp_extract_dir.join(&entry_path);

            match entry.header().entry_type() {
                EntryType::Directory => runtime.create_dir_all(&full_path)?,
                EntryType::Regular | EntryType::Continuous => {
                    if let Some(parent) = full_path.parent() {
                        runtime.create_dir_all(parent)?;
                    }
                    let mut dest_file = runtime.create_file(&full_path)?;
                    std::io::copy(&mut entry, &mut dest_file).map_err(|e| {
                        anyhow::Error::new(e).context(PackageError::archive(format!(
                            "failed to extract {:?}",
                            entry_path
                        )))
                    })?;

                    #[cfg(unix)]
                    if let Ok(mode) = entry.header().mode()
                        && let Err(e) = runtime.set_permissions(&full_path, mode & 0o777)
                    {
                        debug!("Failed to set permissions on {:?}: {}", full_path, e);
                    }
                }
                other => {
                    debug!("Skipping {:?} entry {:?}", other, entry_path);
                    continue;
                }
            }
            count += 1;
        }

        if count == 0 {
            return Err(PackageError::archive(format!("{:?} is empty", archive_path)).into());
        }
        Ok(())
    }
}

/// Moves the unpacked content into `extract_to`, dropping a lone top-level directory.
fn flatten_into<R: Runtime + ?Sized>(
    runtime: &R,
    temp_extract_dir: &Path,
    extract_to: &Path,
) -> Result<()> {
    let entries = runtime
        .read_dir(temp_extract_dir)
        .context("Failed to read temp extraction directory")?;

    let source_dir = match entries.as_slice() {
        [single] if runtime.is_dir(single) => single.clone(),
        [] => return Err(PackageError::archive("archive appears to be empty").into()),
        _ => temp_extract_dir.to_path_buf(),
    };

    runtime.create_dir_all(extract_to)?;
    debug!("Moving contents from {:?} to {:?}", source_dir, extract_to);
    for item in runtime.read_dir(&source_dir)? {
        let Some(name) = item.file_name() else {
            continue;
        };
        runtime.rename(&item, &extract_to.join(name))?;
    }
    Ok(())
}
