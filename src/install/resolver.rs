use anyhow::{Context, Result};
use log::debug;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::PackageError;
use crate::package::PackageCatalog;
use crate::registry::Registry;
use crate::version::{VersionRange, select_best_version};

/// One package the install plan will fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedInstall {
    pub name: String,
    pub version: String,
    /// `None` for the package that was asked for.
    pub required_by: Option<String>,
}

#[derive(Debug)]
struct Selection {
    version: String,
    range: String,
    required_by: Option<String>,
    satisfied_locally: bool,
}

/// Walks `dependencies` breadth-first and picks one version per package.
pub struct DependencyResolver {
    installed: HashMap<String, String>,
}

impl DependencyResolver {
    /// `installed` maps package name to the version currently on disk.
    pub fn new(installed: HashMap<String, String>) -> Self {
        Self { installed }
    }

    /// Resolves `name` (at `range`, or its latest version) and everything it
    /// depends on. Every package comes after all of its dependencies and the
    /// requested package is last. Dependencies already installed at a
    /// satisfying version are left out.
    #[tracing::instrument(skip(self, catalog))]
    pub async fn resolve<G: Registry>(
        &self,
        catalog: &mut PackageCatalog<G>,
        name: &str,
        range: Option<&VersionRange>,
    ) -> Result<Vec<PlannedInstall>> {
        let root = catalog.descriptor(name).await?;
        let root_version = match range {
            Some(range) => select_best_version(range, &root.versions)
                .ok_or_else(|| PackageError::unsatisfiable(name, range.as_str()))?,
            None => root
                .latest
                .clone()
                .ok_or_else(|| PackageError::unsatisfiable(name, "latest"))?,
        };

        let mut selected: HashMap<String, Selection> = HashMap::new();
        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        selected.insert(
            name.to_string(),
            Selection {
                version: root_version,
                range: range.map_or_else(|| "latest".to_string(), |r| r.to_string()),
                required_by: None,
                satisfied_locally: false,
            },
        );
        queue.push_back(name.to_string());

        while let Some(current) = queue.pop_front() {
            let version = selected[&current].version.clone();
            let dependencies = catalog
                .descriptor(&current)
                .await?
                .dependencies_of(&version)
                .cloned()
                .unwrap_or_default();

            for (dep, range_text) in dependencies {
                let dep_range = VersionRange::parse(&range_text)
                    .map_err(PackageError::from)
                    .with_context(|| {
                        format!("{}@{} declares an invalid range for {}", current, version, dep)
                    })?;

                if let Some(existing) = selected.get(&dep) {
                    if dep_range.matches_str(&existing.version) {
                        edges.entry(current.clone()).or_default().push(dep);
                        continue;
                    }
                    return Err(PackageError::unsatisfiable(
                        &dep,
                        format!(
                            "{} (required by {}) and {} (required by {})",
                            existing.range,
                            existing.required_by.as_deref().unwrap_or("the request"),
                            range_text,
                            current
                        ),
                    )
                    .into());
                }

                if let Some(local) = self.installed.get(&dep)
                    && dep_range.matches_str(local)
                {
                    debug!("{} {} already satisfies {}", dep, local, range_text);
                    selected.insert(
                        dep.clone(),
                        Selection {
                            version: local.clone(),
                            range: range_text,
                            required_by: Some(current.clone()),
                            satisfied_locally: true,
                        },
                    );
                    continue;
                }

                let descriptor = catalog
                    .descriptor(&dep)
                    .await
                    .with_context(|| format!("Failed to resolve dependency {} of {}", dep, current))?;
                let chosen = select_best_version(&dep_range, &descriptor.versions)
                    .ok_or_else(|| PackageError::unsatisfiable(&dep, &range_text))?;
                debug!("{} {} selected for {}", dep, chosen, range_text);

                selected.insert(
                    dep.clone(),
                    Selection {
                        version: chosen,
                        range: range_text,
                        required_by: Some(current.clone()),
                        satisfied_locally: false,
                    },
                );
                edges.entry(current.clone()).or_default().push(dep.clone());
                queue.push_back(dep);
            }
        }

        let mut order = Vec::with_capacity(selected.len());
        post_order(name, &edges, &mut HashSet::new(), &mut order);
        Ok(order
            .into_iter()
            .filter_map(|n| {
                let s = selected.remove(&n)?;
                (!s.satisfied_locally).then_some(PlannedInstall {
                    name: n,
                    version: s.version,
                    required_by: s.required_by,
                })
            })
            .collect())
    }
}

/// Appends `node` after everything reachable from it. A cycle is cut at the
/// first package visited twice.
fn post_order(
    node: &str,
    edges: &HashMap<String, Vec<String>>,
    visited: &mut HashSet<String>,
    order: &mut Vec<String>,
) {
    if !visited.insert(node.to_string()) {
        return;
    }
    for dep in edges.get(node).into_iter().flatten() {
        post_order(dep, edges, visited, order);
    }
    order.push(node.to_string());
}
