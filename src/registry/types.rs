use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `author` is either a bare string or an object with a `name`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Author {
    Name(String),
    Person {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        email: Option<String>,
    },
}

impl Author {
    pub fn name(&self) -> Option<&str> {
        match self {
            Author::Name(name) => Some(name),
            Author::Person { name, .. } => name.as_deref(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct DistTags {
    #[serde(default)]
    pub latest: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Dist {
    pub tarball: String,
}

/// One entry of `GET /-/all`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SummaryEntry {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: DistTags,
}

/// The manifest of a single published version.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct VersionManifest {
    #[serde(default)]
    pub name: String,
    pub version: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dist: Option<Dist>,
}

/// Response of `GET /{name}`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct PackageDocument {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionManifest>,
    /// Publish timestamps keyed by version, plus `created`/`modified`.
    #[serde(default)]
    pub time: BTreeMap<String, String>,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: DistTags,
}
