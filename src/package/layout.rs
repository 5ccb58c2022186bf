//! On-disk layout of the install root.
//!
//! ```text
//! <root>/
//!   packages.json          name -> directory, only for renamed packages
//!   .staging/              in-flight downloads and extractions
//!   <display name or name>/
//!     package.json         source of the installed version
//! ```

use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::manifest::PackageManifest;
use crate::error::PackageError;
use crate::runtime::{Runtime, is_path_under};

pub const STAGING_DIR: &str = ".staging";
pub const INDEX_FILE: &str = "packages.json";

/// A package found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub dir: PathBuf,
}

pub struct InstallLayout<R: Runtime> {
    runtime: Arc<R>,
    root: PathBuf,
}

impl<R: Runtime> Clone for InstallLayout<R> {
    fn clone(&self) -> Self {
        Self {
            runtime: Arc::clone(&self.runtime),
            root: self.root.clone(),
        }
    }
}

impl<R: Runtime> InstallLayout<R> {
    pub fn new(runtime: Arc<R>, root: PathBuf) -> Self {
        Self { runtime, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Tarball path and extraction directory for one install attempt.
    /// The version must be a plain path component.
    pub fn staging_paths(&self, name: &str, version: &str) -> Result<(PathBuf, PathBuf)> {
        let mut components = Path::new(version).components();
        let plain = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !plain || version.contains(['/', '\\']) {
            return Err(PackageError::filesystem(format!(
                "version {:?} of {} cannot be used as a path",
                version, name
            ))
            .into());
        }

        let stem = format!("{}-{}", name.replace(['/', '\\'], "_"), version);
        let staging = self.staging_dir();
        Ok((staging.join(format!("{}.tgz", stem)), staging.join(stem)))
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// `<root>/<dir_name>`, refusing names that would land outside the root.
    pub fn package_dir(&self, dir_name: &str) -> Result<PathBuf> {
        let mut components = Path::new(dir_name).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_normal || dir_name.starts_with('.') {
            return Err(PackageError::filesystem(format!(
                "invalid package directory name {:?}",
                dir_name
            ))
            .into());
        }

        let dir = self.root.join(dir_name);
        if !is_path_under(&dir, &self.root) {
            return Err(PackageError::filesystem(format!(
                "{:?} is outside the install root",
                dir
            ))
            .into());
        }
        Ok(dir)
    }

    /// The name -> directory table. Missing file is an empty table.
    #[tracing::instrument(skip(self))]
    pub fn load_index(&self) -> Result<BTreeMap<String, String>> {
        let path = self.index_path();
        if !self.runtime.exists(&path) {
            return Ok(BTreeMap::new());
        }
        let content = self.runtime.read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| {
            anyhow::Error::new(e).context(PackageError::parse(format!("invalid {:?}", path)))
        })
    }

    #[tracing::instrument(skip(self, index))]
    pub fn save_index(&self, index: &BTreeMap<String, String>) -> Result<()> {
        let path = self.index_path();
        if index.is_empty() {
            if self.runtime.exists(&path) {
                self.runtime.remove_file(&path)?;
            }
            return Ok(());
        }
        self.runtime.create_dir_all(&self.root)?;
        let content = serde_json::to_string_pretty(index)?;
        self.runtime
            .write(&path, content.as_bytes())
            .with_context(|| format!("Failed to save package index to {:?}", path))
    }

    /// Records where `name` lives; packages living under their own name
    /// are dropped from the table.
    pub fn record(&self, name: &str, dir_name: &str) -> Result<()> {
        let mut index = self.load_index()?;
        let changed = if dir_name == name {
            index.remove(name).is_some()
        } else {
            index.insert(name.to_string(), dir_name.to_string()).as_deref() != Some(dir_name)
        };
        if changed {
            debug!("Updating package index for {}", name);
            self.save_index(&index)?;
        }
        Ok(())
    }

    pub fn forget(&self, name: &str) -> Result<()> {
        let mut index = self.load_index()?;
        if index.remove(name).is_some() {
            self.save_index(&index)?;
        }
        Ok(())
    }

    /// Directory holding `name`: index entry, then `<root>/<name>`, then any
    /// directory whose `package.json` declares that name.
    #[tracing::instrument(skip(self))]
    pub fn locate(&self, name: &str) -> Result<Option<PathBuf>> {
        if let Some(dir_name) = self.load_index()?.get(name)
            && let Ok(dir) = self.package_dir(dir_name)
            && self.runtime.is_dir(&dir)
        {
            return Ok(Some(dir));
        }

        if let Ok(dir) = self.package_dir(name)
            && self.runtime.is_dir(&dir)
        {
            return Ok(Some(dir));
        }

        Ok(self
            .installed()?
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| p.dir))
    }

    /// Version declared by `<dir>/package.json`.
    pub fn installed_version(&self, dir: &Path) -> Result<Option<String>> {
        Ok(PackageManifest::load(self.runtime.as_ref(), dir)?.map(|m| m.version))
    }

    /// Version of `name` if it is installed.
    pub fn installed_version_of(&self, name: &str) -> Result<Option<String>> {
        match self.locate(name)? {
            Some(dir) => self.installed_version(&dir),
            None => Ok(None),
        }
    }

    /// Every package directory under the root, sorted by name. Directories
    /// without a readable `package.json` are skipped.
    #[tracing::instrument(skip(self))]
    pub fn installed(&self) -> Result<Vec<InstalledPackage>> {
        if !self.runtime.is_dir(&self.root) {
            return Ok(Vec::new());
        }

        let by_dir: BTreeMap<String, String> = self
            .load_index()?
            .into_iter()
            .map(|(name, dir)| (dir, name))
            .collect();

        let mut packages = Vec::new();
        for dir in self.runtime.read_dir(&self.root)? {
            let Some(dir_name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if dir_name.starts_with('.') || !self.runtime.is_dir(&dir) {
                continue;
            }

            let manifest = match PackageManifest::load(self.runtime.as_ref(), &dir) {
                Ok(Some(manifest)) => manifest,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Ignoring {:?}: {:#}", dir, e);
                    continue;
                }
            };

            let name = by_dir
                .get(&dir_name)
                .cloned()
                .or(manifest.name)
                .unwrap_or(dir_name);
            packages.push(InstalledPackage {
                name,
                version: manifest.version,
                dir,
            });
        }

        packages.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(packages)
    }
}

/// Get the default installation root directory
#[tracing::instrument(skip(runtime))]
pub fn default_install_root<R: Runtime + ?Sized>(runtime: &R) -> Result<PathBuf> {
    if runtime.is_privileged() {
        Ok(system_install_root())
    } else {
        let home_dir = runtime
            .home_dir()
            .context("Could not find home directory")?;
        Ok(home_dir.join(".upkg").join("packages"))
    }
}

#[cfg(target_os = "macos")]
fn system_install_root() -> PathBuf {
    PathBuf::from("/opt/upkg")
}

#[cfg(target_os = "windows")]
fn system_install_root() -> PathBuf {
    PathBuf::from(r"C:\ProgramData\upkg")
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn system_install_root() -> PathBuf {
    PathBuf::from("/usr/local/upkg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use crate::test_utils::{test_home, write_package};
    use tempfile::tempdir;

    fn layout(root: &Path) -> InstallLayout<RealRuntime> {
        InstallLayout::new(Arc::new(RealRuntime), root.to_path_buf())
    }

    #[test]
    fn test_default_install_root_user() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| false);
        runtime.expect_home_dir().returning(|| Some(test_home()));

        assert_eq!(
            default_install_root(&runtime).unwrap(),
            test_home().join(".upkg").join("packages")
        );
    }

    #[test]
    fn test_default_install_root_privileged() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| true);

        assert_eq!(default_install_root(&runtime).unwrap(), system_install_root());
    }

    #[test]
    fn test_default_install_root_no_home() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| false);
        runtime.expect_home_dir().returning(|| None);

        assert!(default_install_root(&runtime).is_err());
    }

    #[test]
    fn test_package_dir_stays_under_root() {
        let layout = layout(Path::new("/pkgs"));
        assert_eq!(
            layout.package_dir("Example Core").unwrap(),
            PathBuf::from("/pkgs/Example Core")
        );

        for bad in ["", ".", "..", "../etc", "a/b", ".staging", "/abs"] {
            let err = layout.package_dir(bad).unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<PackageError>(),
                    Some(PackageError::Filesystem(_))
                ),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_staging_paths() {
        let layout = layout(Path::new("/pkgs"));
        let (tarball, dir) = layout.staging_paths("@scope/tool", "1.0.0").unwrap();
        assert_eq!(tarball, PathBuf::from("/pkgs/.staging/@scope_tool-1.0.0.tgz"));
        assert_eq!(dir, PathBuf::from("/pkgs/.staging/@scope_tool-1.0.0"));
    }

    #[test]
    fn test_staging_paths_reject_path_like_versions() {
        let layout = layout(Path::new("/pkgs"));
        for version in ["../../evil", "1.0.0/x", "..\\x", "..", ".", "/abs", ""] {
            let err = layout.staging_paths("pkg", version).unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<PackageError>(),
                    Some(PackageError::Filesystem(_))
                ),
                "{:?} was accepted",
                version
            );
        }
        assert!(layout.staging_paths("pkg", "1.0.0-rc.1+build.5").is_ok());
    }

    #[test]
    fn test_index_record_and_forget() {
        let dir = tempdir().unwrap();
        let layout = layout(dir.path());

        assert!(layout.load_index().unwrap().is_empty());

        layout.record("com.example.core", "Example Core").unwrap();
        layout.record("com.example.util", "com.example.util").unwrap();
        let index = layout.load_index().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index["com.example.core"], "Example Core");

        layout.forget("com.example.core").unwrap();
        assert!(layout.load_index().unwrap().is_empty());
        assert!(!layout.index_path().exists());
    }

    #[test]
    fn test_index_invalid_json() {
        let dir = tempdir().unwrap();
        let layout = layout(dir.path());
        std::fs::write(layout.index_path(), "[1, 2").unwrap();

        let err = layout.load_index().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackageError>(),
            Some(PackageError::Parse(_))
        ));
    }

    #[test]
    fn test_locate_and_installed() {
        let dir = tempdir().unwrap();
        let layout = layout(dir.path());

        write_package(&dir.path().join("Example Core"), "com.example.core", "1.2.0");
        write_package(&dir.path().join("com.example.util"), "com.example.util", "0.3.0");
        // A renamed directory not in the index is still found by its manifest
        write_package(&dir.path().join("Tools"), "com.example.tools", "2.0.0");
        std::fs::create_dir_all(dir.path().join(".staging/partial")).unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        layout.record("com.example.core", "Example Core").unwrap();

        assert_eq!(
            layout.locate("com.example.core").unwrap(),
            Some(dir.path().join("Example Core"))
        );
        assert_eq!(
            layout.locate("com.example.util").unwrap(),
            Some(dir.path().join("com.example.util"))
        );
        assert_eq!(
            layout.locate("com.example.tools").unwrap(),
            Some(dir.path().join("Tools"))
        );
        assert_eq!(layout.locate("missing").unwrap(), None);

        assert_eq!(
            layout.installed_version_of("com.example.core").unwrap().as_deref(),
            Some("1.2.0")
        );

        let installed = layout.installed().unwrap();
        let names: Vec<_> = installed.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["com.example.core", "com.example.tools", "com.example.util"]
        );
    }

    #[test]
    fn test_installed_missing_root() {
        let dir = tempdir().unwrap();
        let layout = layout(&dir.path().join("nowhere"));
        assert!(layout.installed().unwrap().is_empty());
    }
}
