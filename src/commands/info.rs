use anyhow::Result;

use crate::config::{Config, ConfigOptions};
use crate::package::PackageDescriptor;
use crate::registry::Registry;
use crate::runtime::Runtime;

/// Show registry metadata for one package and what is installed locally.
#[tracing::instrument(skip(runtime, options))]
pub async fn info<R: Runtime + 'static>(runtime: R, name: &str, options: ConfigOptions) -> Result<()> {
    let config = Config::new(runtime, options)?;
    for line in run(&config, name).await? {
        println!("{}", line);
    }
    Ok(())
}

async fn run<R: Runtime + 'static, G: Registry>(config: &Config<R, G>, name: &str) -> Result<Vec<String>> {
    let mut catalog = config.catalog();
    let installed = config.layout().installed_version_of(name)?;
    let descriptor = catalog.descriptor(name).await?;
    descriptor.set_installed(installed);
    Ok(describe(descriptor))
}

fn describe(descriptor: &PackageDescriptor) -> Vec<String> {
    let mut lines = vec![descriptor.name.clone()];
    let mut field = |label: &str, value: Option<&str>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            lines.push(format!("  {:<13}{}", format!("{}:", label), value));
        }
    };

    field("display name", descriptor.display_name.as_deref());
    field("description", descriptor.description.as_deref());
    field("author", descriptor.author.as_deref());
    field("latest", descriptor.latest.as_deref());
    field("installed", Some(descriptor.installed_version.as_deref().unwrap_or("no")));
    field("versions", Some(&descriptor.versions.join(", ")));

    if !descriptor.dependencies.is_empty() {
        lines.push("  dependencies:".to_string());
        for (dep, range) in &descriptor.dependencies {
            lines.push(format!("    {} {}", dep, range));
        }
    }
    lines
}
