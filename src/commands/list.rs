use anyhow::Result;
use log::debug;

use crate::config::{Config, ConfigOptions};
use crate::package::InstalledPackage;
use crate::registry::Registry;
use crate::runtime::Runtime;

/// List all installed packages
#[tracing::instrument(skip(runtime, options))]
pub fn list<R: Runtime + 'static>(runtime: R, options: ConfigOptions) -> Result<()> {
    let config = Config::new(runtime, options)?;
    for line in run(&config)? {
        println!("{}", line);
    }
    Ok(())
}

fn run<R: Runtime + 'static, G: Registry>(config: &Config<R, G>) -> Result<Vec<String>> {
    debug!("Listing packages from {:?}", config.install_root);

    let packages = config.layout().installed()?;
    if packages.is_empty() {
        return Ok(vec!["No packages installed.".to_string()]);
    }
    debug!("Found {} package(s)", packages.len());

    Ok(packages.iter().map(format_installed).collect())
}

fn format_installed(package: &InstalledPackage) -> String {
    let dir_name = package
        .dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if dir_name == package.name {
        format!("{} {}", package.name, package.version)
    } else {
        format!("{} {} ({})", package.name, package.version, dir_name)
    }
}
