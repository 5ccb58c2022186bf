//! npm-style registry protocol: package list, package documents, tarballs.

mod client;
mod types;

#[cfg(test)]
pub use client::MockRegistry;
pub use client::{DEFAULT_REGISTRY_URL, Registry, RegistryClient};
pub use types::{Author, Dist, DistTags, PackageDocument, SummaryEntry, VersionManifest};
