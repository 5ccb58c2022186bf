use anyhow::Result;

use crate::config::{Config, ConfigOptions};
use crate::registry::Registry;
use crate::runtime::Runtime;

/// Remove an installed package
#[tracing::instrument(skip(runtime, options))]
pub async fn uninstall<R: Runtime + 'static>(runtime: R, name: &str, options: ConfigOptions) -> Result<()> {
    let config = Config::new(runtime, options)?;
    println!("{}", run(&config, name).await?);
    Ok(())
}

async fn run<R: Runtime + 'static, G: Registry>(config: &Config<R, G>, name: &str) -> Result<String> {
    let installer = config.installer();
    let version = config.layout().installed_version_of(name)?;
    installer.uninstall(name).await?;
    Ok(match version {
        Some(version) => format!("Uninstalled {} {}", name, version),
        None => format!("Uninstalled {}", name),
    })
}
