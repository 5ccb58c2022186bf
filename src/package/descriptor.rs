use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::PackageError;
use crate::registry::{PackageDocument, SummaryEntry};
use crate::version::{SemanticVersion, VersionComparer};

/// A row of the registry's package list.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PackageSummary {
    pub name: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub latest: Option<String>,
}

impl From<SummaryEntry> for PackageSummary {
    fn from(entry: SummaryEntry) -> Self {
        Self {
            author: entry.author.as_ref().and_then(|a| a.name()).map(String::from),
            name: entry.name,
            description: entry.description,
            latest: entry.dist_tags.latest,
        }
    }
}

/// Registry metadata for one package, plus what is installed locally.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct PackageDescriptor {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    /// Ascending.
    pub versions: Vec<String>,
    pub latest: Option<String>,
    /// Dependencies declared by `latest`.
    pub dependencies: BTreeMap<String, String>,
    /// Publish timestamp per version.
    pub published: BTreeMap<String, String>,
    pub installed_version: Option<String>,
    #[serde(skip)]
    version_dependencies: BTreeMap<String, BTreeMap<String, String>>,
}

impl PackageDescriptor {
    /// Builds a descriptor from `GET /{name}`. Under a strict comparer an
    /// unparsable published version is a parse error.
    pub fn from_document(doc: PackageDocument, comparer: &VersionComparer) -> Result<Self> {
        let mut versions: Vec<String> = doc.versions.keys().cloned().collect();
        comparer.sort(&mut versions).map_err(|e| {
            PackageError::parse(format!("package {} has an invalid version: {}", doc.name, e))
        })?;

        let latest = match doc.dist_tags.latest {
            Some(tag) if doc.versions.contains_key(&tag) => Some(tag),
            _ => versions
                .iter()
                .rev()
                .find(|v| SemanticVersion::parse(v).is_ok())
                .or(versions.last())
                .cloned(),
        };

        let latest_manifest = latest.as_ref().and_then(|v| doc.versions.get(v));
        let display_name = latest_manifest.and_then(|m| m.display_name.clone());
        let description = latest_manifest
            .and_then(|m| m.description.clone())
            .or(doc.description);
        let author = latest_manifest
            .and_then(|m| m.author.as_ref())
            .and_then(|a| a.name())
            .map(String::from);
        let dependencies = latest_manifest
            .map(|m| m.dependencies.clone())
            .unwrap_or_default();

        let published = doc
            .time
            .into_iter()
            .filter(|(version, _)| doc.versions.contains_key(version))
            .collect();

        let version_dependencies = doc
            .versions
            .into_iter()
            .map(|(version, manifest)| (version, manifest.dependencies))
            .collect();

        Ok(Self {
            name: doc.name,
            display_name,
            description,
            author,
            versions,
            latest,
            dependencies,
            published,
            installed_version: None,
            version_dependencies,
        })
    }

    /// Directory name under the install root: display name if set, else name.
    pub fn install_dir_name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(display) if !display.trim().is_empty() => display,
            _ => &self.name,
        }
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    /// Dependencies declared by a specific version.
    pub fn dependencies_of(&self, version: &str) -> Option<&BTreeMap<String, String>> {
        self.version_dependencies.get(version)
    }

    /// Records the outcome of a completed install (`Some`) or uninstall (`None`).
    pub fn set_installed(&mut self, version: Option<String>) {
        self.installed_version = version;
    }
}
