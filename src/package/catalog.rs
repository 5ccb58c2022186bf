use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

use super::descriptor::{PackageDescriptor, PackageSummary};
use crate::registry::Registry;
use crate::version::VersionComparer;

/// Session cache of registry descriptors. Nothing here outlives the process.
pub struct PackageCatalog<G: Registry> {
    registry: Arc<G>,
    comparer: VersionComparer,
    concurrency: usize,
    descriptors: HashMap<String, PackageDescriptor>,
}

impl<G: Registry> PackageCatalog<G> {
    pub fn new(registry: Arc<G>, comparer: VersionComparer, concurrency: usize) -> Self {
        Self {
            registry,
            comparer,
            concurrency: concurrency.max(1),
            descriptors: HashMap::new(),
        }
    }

    /// Every package in the registry.
    pub async fn available(&self) -> Result<Vec<PackageSummary>> {
        let entries = self.registry.fetch_all().await?;
        Ok(entries.into_iter().map(PackageSummary::from).collect())
    }

    /// Descriptor for `name`, fetched on first use.
    #[tracing::instrument(skip(self))]
    pub async fn descriptor(&mut self, name: &str) -> Result<&mut PackageDescriptor> {
        if !self.descriptors.contains_key(name) {
            let descriptor = fetch_descriptor(self.registry.as_ref(), &self.comparer, name).await?;
            self.descriptors.insert(name.to_string(), descriptor);
        }
        self.descriptors
            .get_mut(name)
            .with_context(|| format!("descriptor for {} was not cached", name))
    }

    pub fn cached(&self, name: &str) -> Option<&PackageDescriptor> {
        self.descriptors.get(name)
    }

    /// Fetches descriptors for `names` concurrently. A package that fails to
    /// load is logged and left out; the rest of the batch still completes.
    #[tracing::instrument(skip(self, names))]
    pub async fn fetch_descriptors(&mut self, names: &[String]) -> Vec<PackageDescriptor> {
        let missing: Vec<&String> = names
            .iter()
            .filter(|name| !self.descriptors.contains_key(name.as_str()))
            .collect();
        debug!(
            "Fetching {} descriptors ({} cached)",
            missing.len(),
            names.len() - missing.len()
        );

        let registry = self.registry.as_ref();
        let comparer = &self.comparer;
        let fetched: Vec<(String, Result<PackageDescriptor>)> = stream::iter(missing)
            .map(|name| async move {
                (
                    name.clone(),
                    fetch_descriptor(registry, comparer, name).await,
                )
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (name, result) in fetched {
            match result {
                Ok(descriptor) => {
                    self.descriptors.insert(name, descriptor);
                }
                Err(e) => warn!("Skipping {}: {:#}", name, e),
            }
        }

        names
            .iter()
            .filter_map(|name| self.descriptors.get(name).cloned())
            .collect()
    }

    /// Mirrors a finished install or uninstall into the cached descriptor.
    pub fn mark_installed(&mut self, name: &str, version: Option<String>) {
        if let Some(descriptor) = self.descriptors.get_mut(name) {
            descriptor.set_installed(version);
        }
    }
}

async fn fetch_descriptor<G: Registry + ?Sized>(
    registry: &G,
    comparer: &VersionComparer,
    name: &str,
) -> Result<PackageDescriptor> {
    let document = registry.fetch_package(name).await?;
    PackageDescriptor::from_document(document, comparer)
}
