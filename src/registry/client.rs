use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{Map, Value};

use super::types::{PackageDocument, SummaryEntry};
use crate::http::HttpClient;

pub const DEFAULT_REGISTRY_URL: &str = "http://localhost:4873";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Registry: Send + Sync {
    /// Every package the registry knows about, sorted by name.
    async fn fetch_all(&self) -> Result<Vec<SummaryEntry>>;

    /// Full document for one package.
    async fn fetch_package(&self, name: &str) -> Result<PackageDocument>;

    /// Download URL of the tarball for `name@version`.
    fn tarball_url(&self, name: &str, version: &str) -> String;

    fn url(&self) -> &str;
}

pub struct RegistryClient {
    http: HttpClient,
    base_url: String,
}

impl RegistryClient {
    #[tracing::instrument(skip(http, base_url))]
    pub fn new(http: HttpClient, base_url: Option<String>) -> Self {
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self { http, base_url }
    }
}

/// Scoped names keep their `@` but the separator is escaped in document URLs.
fn encode_name(name: &str) -> String {
    name.replace('/', "%2f")
}

/// Drops `_updated` and any entry that does not look like a package.
fn parse_all(raw: Map<String, Value>) -> Vec<SummaryEntry> {
    let mut entries: Vec<SummaryEntry> = raw
        .into_iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .filter_map(
            |(key, value)| match serde_json::from_value::<SummaryEntry>(value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping malformed registry entry {}: {}", key, e);
                    None
                }
            },
        )
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

#[async_trait]
impl Registry for RegistryClient {
    #[tracing::instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<SummaryEntry>> {
        let url = format!("{}/-/all", self.base_url);
        debug!("Fetching package list from {}...", url);

        let raw: Map<String, Value> = self
            .http
            .get_json(&url)
            .await
            .context("Failed to fetch the package list")?;

        Ok(parse_all(raw))
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_package(&self, name: &str) -> Result<PackageDocument> {
        let url = format!("{}/{}", self.base_url, encode_name(name));
        debug!("Fetching package document from {}...", url);

        self.http
            .get_json(&url)
            .await
            .with_context(|| format!("Failed to fetch package {}", name))
    }

    fn tarball_url(&self, name: &str, version: &str) -> String {
        let basename = name.rsplit('/').next().unwrap_or(name);
        format!("{}/{}/-/{}-{}.tgz", self.base_url, name, basename, version)
    }

    fn url(&self) -> &str {
        &self.base_url
    }
}
