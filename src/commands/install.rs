use anyhow::{Context, Result};
use futures_util::future::join_all;
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::cleanup::spawn_interrupt_handler;
use crate::config::{Config, ConfigOptions};
use crate::error::PackageError;
use crate::install::{DependencyResolver, PlannedInstall};
use crate::registry::Registry;
use crate::runtime::Runtime;
use crate::version::{VersionRange, select_best_version};

/// `name[@range]` as typed on the command line.
#[derive(Debug, Clone)]
pub struct PackageRequest {
    pub name: String,
    pub range: Option<VersionRange>,
}

impl FromStr for PackageRequest {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // A leading '@' belongs to a scoped name, not to the range
        let (name, range) = match s.rfind('@').filter(|&i| i > 0) {
            Some(i) => (&s[..i], Some(&s[i + 1..])),
            None => (s, None),
        };
        if name.is_empty() {
            return Err(PackageError::parse(format!("missing package name in '{}'", s)));
        }
        let range = match range {
            Some(text) if text.trim().is_empty() => {
                return Err(PackageError::parse(format!("missing version range in '{}'", s)));
            }
            Some(text) => Some(VersionRange::parse(text)?),
            None => None,
        };
        Ok(Self {
            name: name.to_string(),
            range,
        })
    }
}

impl fmt::Display for PackageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            Some(range) => write!(f, "{}@{}", self.name, range),
            None => f.write_str(&self.name),
        }
    }
}

/// Install a package and, unless `no_deps`, the dependencies it needs.
#[tracing::instrument(skip(runtime, options))]
pub async fn install<R: Runtime + 'static>(
    runtime: R,
    request: PackageRequest,
    no_deps: bool,
    options: ConfigOptions,
) -> Result<()> {
    let config = Config::new(runtime, options)?;
    for line in run(&config, &request, no_deps).await? {
        println!("{}", line);
    }
    Ok(())
}

async fn run<R: Runtime + 'static, G: Registry>(
    config: &Config<R, G>,
    request: &PackageRequest,
    no_deps: bool,
) -> Result<Vec<String>> {
    let layout = config.layout();
    let mut catalog = config.catalog();
    let installer = config.installer();

    let installed: HashMap<String, String> = layout
        .installed()?
        .into_iter()
        .map(|p| (p.name, p.version))
        .collect();

    let plan = if no_deps {
        let descriptor = catalog.descriptor(&request.name).await?;
        let version = match &request.range {
            Some(range) => select_best_version(range, &descriptor.versions)
                .ok_or_else(|| PackageError::unsatisfiable(&request.name, range.as_str()))?,
            None => descriptor
                .latest
                .clone()
                .ok_or_else(|| PackageError::unsatisfiable(&request.name, "latest"))?,
        };
        vec![PlannedInstall {
            name: request.name.clone(),
            version,
            required_by: None,
        }]
    } else {
        DependencyResolver::new(installed.clone())
            .resolve(&mut catalog, &request.name, request.range.as_ref())
            .await?
    };
    debug!("Install plan for {}: {:?}", request, plan);

    let mut lines = Vec::new();
    let mut pending = Vec::new();
    for step in plan {
        if installed.get(&step.name) == Some(&step.version) {
            lines.push(format!("{} {} is already installed", step.name, step.version));
            continue;
        }
        let descriptor = catalog
            .cached(&step.name)
            .cloned()
            .with_context(|| format!("no descriptor loaded for {}", step.name))?;
        pending.push((step, descriptor));
    }
    let root = if pending
        .last()
        .is_some_and(|(step, _)| step.required_by.is_none())
    {
        pending.pop()
    } else {
        None
    };

    let handler = spawn_interrupt_handler(Arc::clone(&config.runtime), installer.cleanup_context());

    // Dependencies are independent of each other; the requested package goes last
    let results = join_all(pending.iter().map(|(step, descriptor)| {
        let installer = &installer;
        async move {
            let result = installer.install_version(descriptor, &step.version).await;
            (step, result)
        }
    }))
    .await;

    let mut first_error = None;
    for (step, result) in results {
        match result {
            Ok(version) => {
                catalog.mark_installed(&step.name, Some(version.clone()));
                lines.push(format!(
                    "Installed {} {} (required by {})",
                    step.name,
                    version,
                    step.required_by.as_deref().unwrap_or("-")
                ));
            }
            Err(e) => {
                warn!("{:#}", e);
                first_error.get_or_insert(e);
            }
        }
    }

    if first_error.is_none()
        && let Some((step, descriptor)) = &root
    {
        match installer.install_version(descriptor, &step.version).await {
            Ok(version) => {
                catalog.mark_installed(&step.name, Some(version.clone()));
                lines.push(format!("Installed {} {}", step.name, version));
            }
            Err(e) => first_error = Some(e),
        }
    }

    handler.abort();

    match first_error {
        Some(e) => {
            for line in &lines {
                println!("{}", line);
            }
            Err(e)
        }
        None => Ok(lines),
    }
}
