use anyhow::Result;
use futures_util::future::join_all;
use log::{debug, warn};
use std::sync::Arc;

use crate::cleanup::spawn_interrupt_handler;
use crate::config::{Config, ConfigOptions};
use crate::registry::Registry;
use crate::runtime::Runtime;

/// Upgrade every installed package to its latest registry version.
#[tracing::instrument(skip(runtime, options))]
pub async fn upgrade<R: Runtime + 'static>(runtime: R, options: ConfigOptions) -> Result<()> {
    let config = Config::new(runtime, options)?;
    for line in run(&config).await? {
        println!("{}", line);
    }
    Ok(())
}

async fn run<R: Runtime + 'static, G: Registry>(config: &Config<R, G>) -> Result<Vec<String>> {
    let installed = config.layout().installed()?;
    if installed.is_empty() {
        return Ok(vec!["No packages installed.".to_string()]);
    }

    let mut catalog = config.catalog();
    let names: Vec<String> = installed.iter().map(|p| p.name.clone()).collect();
    let descriptors = catalog.fetch_descriptors(&names).await;

    let mut upgrades = Vec::new();
    for package in &installed {
        let Some(descriptor) = descriptors.iter().find(|d| d.name == package.name) else {
            continue;
        };
        let Some(latest) = descriptor.latest.as_deref() else {
            debug!("{} has no published versions", package.name);
            continue;
        };
        match config.comparer.is_newer(latest, &package.version) {
            Ok(true) => upgrades.push((package, descriptor, latest.to_string())),
            Ok(false) => debug!("{} {} is up to date", package.name, package.version),
            Err(e) => warn!("Skipping {}: {}", package.name, e),
        }
    }

    if upgrades.is_empty() {
        return Ok(vec!["All packages are up to date.".to_string()]);
    }

    let installer = config.installer();
    let handler = spawn_interrupt_handler(Arc::clone(&config.runtime), installer.cleanup_context());
    let results = join_all(upgrades.iter().map(|(package, descriptor, latest)| {
        let installer = &installer;
        async move {
            let result = installer.install_version(descriptor, latest).await;
            (package, result)
        }
    }))
    .await;
    handler.abort();

    let mut lines = Vec::new();
    let mut first_error = None;
    for (package, result) in results {
        match result {
            Ok(version) => lines.push(format!(
                "Upgraded {} {} -> {}",
                package.name, package.version, version
            )),
            Err(e) => {
                warn!("{:#}", e);
                first_error.get_or_insert(e);
            }
        }
    }

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use crate::test_utils::{tarball, write_package};
    use tempfile::tempdir;

    fn config(root: &std::path::Path, url: String) -> Config<RealRuntime> {
        Config::new(
            RealRuntime,
            ConfigOptions {
                install_root: Some(root.to_path_buf()),
                registry_url: Some(url),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_upgrade_outdated_packages() {
        let dir = tempdir().unwrap();
        write_package(&dir.path().join("core"), "core", "1.0.0");
        write_package(&dir.path().join("util"), "util", "0.3.0");
        write_package(&dir.path().join("gone"), "gone", "1.0.0");

        let mut server = mockito::Server::new_async().await;
        let _core = server
            .mock("GET", "/core")
            .with_status(200)
            .with_body(
                r#"{"name": "core", "versions": {
                    "1.0.0": {"name": "core", "version": "1.0.0"},
                    "1.1.0": {"name": "core", "version": "1.1.0"}}}"#,
            )
            .create_async()
            .await;
        let _core_tgz = server
            .mock("GET", "/core/-/core-1.1.0.tgz")
            .with_status(200)
            .with_body(tarball("core", "1.1.0", &[]))
            .create_async()
            .await;
        let _util = server
            .mock("GET", "/util")
            .with_status(200)
            .with_body(r#"{"name": "util", "versions": {"0.3.0": {"name": "util", "version": "0.3.0"}}}"#)
            .create_async()
            .await;
        let _gone = server
            .mock("GET", "/gone")
            .with_status(404)
            .create_async()
            .await;

        let lines = run(&config(dir.path(), server.url())).await.unwrap();

        assert_eq!(lines, vec!["Upgraded core 1.0.0 -> 1.1.0"]);
        let manifest = std::fs::read_to_string(dir.path().join("core/package.json")).unwrap();
        assert!(manifest.contains("1.1.0"));
    }

    #[tokio::test]
    async fn test_upgrade_nothing_installed() {
        let dir = tempdir().unwrap();
        let lines = run(&config(dir.path(), "http://127.0.0.1:1".into()))
            .await
            .unwrap();
        assert_eq!(lines, vec!["No packages installed."]);
    }
}
