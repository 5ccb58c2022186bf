use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::gate::OperationGate;
use super::state::InstallState;
use crate::archive::{ArchiveExtractor, TarGzExtractor};
use crate::cleanup::{self, CleanupGuard, SharedCleanupContext};
use crate::download::download_file;
use crate::error::PackageError;
use crate::http::HttpClient;
use crate::package::{InstallLayout, PackageDescriptor, PackageManifest};
use crate::registry::Registry;
use crate::runtime::Runtime;
use crate::version::{VersionRange, select_best_version};

/// Downloads, unpacks and places packages under the install root.
///
/// All methods take `&self` and may run concurrently: operations on one
/// package name are serialized, operations on different names run in
/// parallel up to the gate's limit.
pub struct PackageInstaller<R, G, E = TarGzExtractor>
where
    R: Runtime + 'static,
    G: Registry,
    E: ArchiveExtractor + 'static,
{
    layout: InstallLayout<R>,
    registry: Arc<G>,
    http: HttpClient,
    extractor: Arc<E>,
    gate: OperationGate,
    states: Mutex<HashMap<String, InstallState>>,
    index_lock: tokio::sync::Mutex<()>,
    cleanup_ctx: SharedCleanupContext,
}

impl<R: Runtime + 'static, G: Registry> PackageInstaller<R, G, TarGzExtractor> {
    pub fn new(
        layout: InstallLayout<R>,
        registry: Arc<G>,
        http: HttpClient,
        max_concurrency: usize,
    ) -> Self {
        Self::with_extractor(layout, registry, http, TarGzExtractor, max_concurrency)
    }
}

impl<R, G, E> PackageInstaller<R, G, E>
where
    R: Runtime + 'static,
    G: Registry,
    E: ArchiveExtractor + 'static,
{
    pub fn with_extractor(
        layout: InstallLayout<R>,
        registry: Arc<G>,
        http: HttpClient,
        extractor: E,
        max_concurrency: usize,
    ) -> Self {
        Self {
            layout,
            registry,
            http,
            extractor: Arc::new(extractor),
            gate: OperationGate::new(max_concurrency),
            states: Mutex::new(HashMap::new()),
            index_lock: tokio::sync::Mutex::new(()),
            cleanup_ctx: cleanup::new_shared(),
        }
    }

    pub fn layout(&self) -> &InstallLayout<R> {
        &self.layout
    }

    /// Paths removed if the process is interrupted mid-operation.
    pub fn cleanup_context(&self) -> SharedCleanupContext {
        Arc::clone(&self.cleanup_ctx)
    }

    /// Current state of `name`. Packages this installer has not touched
    /// are reported from what is on disk.
    pub fn state(&self, name: &str) -> InstallState {
        if let Some(state) = self.lock_states().get(name) {
            return state.clone();
        }
        self.state_on_disk(name)
    }

    fn state_on_disk(&self, name: &str) -> InstallState {
        match self.layout.locate(name) {
            Ok(None) => InstallState::NotInstalled,
            Ok(Some(dir)) => match self.layout.installed_version(&dir) {
                Ok(Some(version)) => InstallState::Installed(version),
                Ok(None) => InstallState::Failed(format!("{:?} has no package.json", dir)),
                Err(e) => InstallState::Failed(format!("{:#}", e)),
            },
            Err(e) => InstallState::Failed(format!("{:#}", e)),
        }
    }

    fn lock_states(&self) -> std::sync::MutexGuard<'_, HashMap<String, InstallState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn advance(&self, name: &str, next: InstallState) -> Result<()> {
        let current = self.state(name);
        let next = current.transition(next)?;
        info!("{}: {} -> {}", name, current, next);
        self.lock_states().insert(name.to_string(), next);
        Ok(())
    }

    /// Starts an operation. Must be called with the package's gate permit
    /// held, so an active state left behind can only come from an operation
    /// that was cancelled.
    fn begin(&self, name: &str, next: InstallState) -> Result<()> {
        let current = self.state(name);
        if current.is_active() {
            warn!("{}: previous operation was interrupted while {}", name, current);
            self.lock_states().insert(
                name.to_string(),
                InstallState::Failed(format!("interrupted while {}", current)),
            );
        }
        self.advance(name, next)
    }

    fn fail(&self, name: &str, error: &anyhow::Error) {
        let failed = InstallState::Failed(format!("{:#}", error));
        if let Err(e) = self.advance(name, failed) {
            debug!("{}: not recording failure: {}", name, e);
        }
    }

    /// Installs the best version of `descriptor` matching `range`, or its
    /// latest version. Returns the installed version.
    pub async fn install(
        &self,
        descriptor: &PackageDescriptor,
        range: Option<&VersionRange>,
    ) -> Result<String> {
        let version = match range {
            Some(range) => select_best_version(range, &descriptor.versions)
                .ok_or_else(|| PackageError::unsatisfiable(&descriptor.name, range.as_str()))?,
            None => descriptor
                .latest
                .clone()
                .ok_or_else(|| PackageError::unsatisfiable(&descriptor.name, "latest"))?,
        };
        self.install_version(descriptor, &version).await
    }

    /// Installs exactly `version` of `descriptor`.
    #[tracing::instrument(skip(self, descriptor), fields(name = %descriptor.name))]
    pub async fn install_version(
        &self,
        descriptor: &PackageDescriptor,
        version: &str,
    ) -> Result<String> {
        let name = descriptor.name.as_str();
        if !descriptor.has_version(version) {
            return Err(PackageError::unsatisfiable(name, version).into());
        }

        let _permit = self.gate.acquire(name).await?;
        self.begin(name, InstallState::Downloading)?;

        match self.run_install(descriptor, version).await {
            Ok(installed) => {
                self.advance(name, InstallState::Installed(installed.clone()))?;
                Ok(installed)
            }
            Err(e) => {
                self.fail(name, &e);
                Err(e.context(format!("Failed to install {}@{}", name, version)))
            }
        }
    }

    async fn run_install(&self, descriptor: &PackageDescriptor, version: &str) -> Result<String> {
        let name = descriptor.name.as_str();
        let runtime = Arc::clone(self.layout.runtime());
        let dir_name = descriptor.install_dir_name().to_string();
        let target = self.layout.package_dir(&dir_name)?;
        let (tarball, staging_dir) = self.layout.staging_paths(name, version)?;

        // Leftovers from an earlier attempt at the same version
        for stale in [&tarball, &staging_dir] {
            if runtime.is_dir(stale) {
                runtime.remove_dir_all(stale)?;
            } else if runtime.exists(stale) {
                runtime.remove_file(stale)?;
            }
        }
        runtime
            .create_dir_all(&self.layout.staging_dir())
            .map_err(|e| e.context(PackageError::filesystem("cannot create staging directory")))?;

        let tarball_guard = CleanupGuard::new(self.cleanup_context(), tarball.clone());
        let staging_guard = CleanupGuard::new(self.cleanup_context(), staging_dir.clone());

        let url = self.registry.tarball_url(name, version);
        download_file(runtime.as_ref(), &url, &tarball, &self.http).await?;

        self.advance(name, InstallState::Extracting)?;
        {
            let runtime = Arc::clone(&runtime);
            let extractor = Arc::clone(&self.extractor);
            let ctx = self.cleanup_context();
            let (tarball, staging_dir) = (tarball.clone(), staging_dir.clone());
            tokio::task::spawn_blocking(move || {
                extractor.extract_with_cleanup(runtime.as_ref(), &tarball, &staging_dir, ctx)
            })
            .await
            .context("extraction task failed")??;
        }

        let manifest = PackageManifest::load(runtime.as_ref(), &staging_dir)?.ok_or_else(|| {
            PackageError::archive(format!("{}@{} has no package.json", name, version))
        })?;
        if manifest.version != version {
            warn!(
                "{}: package.json declares version {} but {} was requested",
                name, manifest.version, version
            );
        }

        self.advance(name, InstallState::Installing)?;
        if let Some(existing) = PackageManifest::load(runtime.as_ref(), &target)?
            && let Some(owner) = existing.name.as_deref()
            && owner != name
        {
            return Err(PackageError::filesystem(format!(
                "{:?} already holds package {}",
                target, owner
            ))
            .into());
        }
        let previous = self.layout.locate(name)?.filter(|dir| *dir != target);

        {
            let runtime = Arc::clone(&runtime);
            let (tarball, staging_dir, target) = (tarball.clone(), staging_dir.clone(), target.clone());
            tokio::task::spawn_blocking(move || {
                replace_dir(runtime.as_ref(), previous, &staging_dir, &target)?;
                if runtime.exists(&tarball) {
                    runtime.remove_file(&tarball)?;
                }
                Ok::<_, anyhow::Error>(())
            })
            .await
            .context("install task failed")?
            .map_err(|e| e.context(PackageError::filesystem(format!("cannot install {}", name))))?;
        }

        {
            let _index = self.index_lock.lock().await;
            self.layout.record(name, &dir_name)?;
        }

        tarball_guard.success();
        staging_guard.success();
        info!("Installed {} {} into {:?}", name, manifest.version, target);
        Ok(manifest.version)
    }

    /// Removes `name` from the install root.
    #[tracing::instrument(skip(self))]
    pub async fn uninstall(&self, name: &str) -> Result<()> {
        let _permit = self.gate.acquire(name).await?;

        let dir = self
            .layout
            .locate(name)?
            .ok_or_else(|| PackageError::NotInstalled(name.to_string()))?;

        // While idle the disk is authoritative; only failures are remembered
        if !matches!(self.state(name), InstallState::Failed(_)) {
            self.lock_states().remove(name);
        }
        self.begin(name, InstallState::Uninstalling)?;
        match self.run_uninstall(name, dir).await {
            Ok(()) => self.advance(name, InstallState::NotInstalled),
            Err(e) => {
                self.fail(name, &e);
                Err(e.context(format!("Failed to uninstall {}", name)))
            }
        }
    }

    async fn run_uninstall(&self, name: &str, dir: PathBuf) -> Result<()> {
        let runtime = Arc::clone(self.layout.runtime());
        let removed = dir.clone();
        tokio::task::spawn_blocking(move || runtime.remove_dir_all(&dir))
            .await
            .context("uninstall task failed")?
            .map_err(|e| e.context(PackageError::filesystem(format!("cannot remove {}", name))))?;

        {
            let _index = self.index_lock.lock().await;
            self.layout.forget(name)?;
        }
        info!("Uninstalled {} from {:?}", name, removed);
        Ok(())
    }
}

/// Swaps `staging_dir` in as `target`, removing whatever was there before.
fn replace_dir<R: Runtime + ?Sized>(
    runtime: &R,
    previous: Option<PathBuf>,
    staging_dir: &std::path::Path,
    target: &std::path::Path,
) -> Result<()> {
    if let Some(previous) = previous
        && runtime.is_dir(&previous)
    {
        debug!("Removing previous location {:?}", previous);
        runtime.remove_dir_all(&previous)?;
    }
    if runtime.is_dir(target) {
        debug!("Replacing {:?}", target);
        runtime.remove_dir_all(target)?;
    }
    runtime.rename(staging_dir, target)
}
