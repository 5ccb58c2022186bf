use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::PackageError;
use crate::runtime::Runtime;

pub const MANIFEST_FILE: &str = "package.json";

/// The `package.json` shipped inside a package tarball.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,
    pub version: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

impl PackageManifest {
    /// Reads `<dir>/package.json`. A missing file is `Ok(None)`.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime + ?Sized>(runtime: &R, dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILE);
        if !runtime.exists(&path) {
            return Ok(None);
        }
        let content = runtime.read_to_string(&path)?;
        let manifest: PackageManifest = serde_json::from_str(&content).map_err(|e| {
            anyhow::Error::new(e).context(PackageError::parse(format!("invalid {:?}", path)))
        })?;
        if manifest.version.trim().is_empty() {
            return Err(PackageError::parse(format!("{:?} has an empty version", path)).into());
        }
        Ok(Some(manifest))
    }
}
