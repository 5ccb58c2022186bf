use anyhow::Result;
use log::debug;
use std::collections::HashMap;

use crate::config::{Config, ConfigOptions};
use crate::package::PackageSummary;
use crate::registry::Registry;
use crate::runtime::Runtime;

/// List every package on the registry, marking installed ones.
#[tracing::instrument(skip(runtime, options))]
pub async fn available<R: Runtime + 'static>(runtime: R, options: ConfigOptions) -> Result<()> {
    let config = Config::new(runtime, options)?;
    for line in run(&config).await? {
        println!("{}", line);
    }
    Ok(())
}

async fn run<R: Runtime + 'static, G: Registry>(config: &Config<R, G>) -> Result<Vec<String>> {
    let summaries = config.catalog().available().await?;
    debug!(
        "Registry {} lists {} package(s)",
        config.registry.url(),
        summaries.len()
    );
    if summaries.is_empty() {
        return Ok(vec!["No packages available.".to_string()]);
    }

    let installed: HashMap<String, String> = config
        .layout()
        .installed()?
        .into_iter()
        .map(|p| (p.name, p.version))
        .collect();

    Ok(summaries
        .iter()
        .map(|s| format_summary(s, installed.get(&s.name).map(String::as_str)))
        .collect())
}

fn format_summary(summary: &PackageSummary, installed: Option<&str>) -> String {
    let mut line = format!(
        "{} {}",
        summary.name,
        summary.latest.as_deref().unwrap_or("-")
    );
    if let Some(version) = installed {
        line.push_str(&format!(" [installed {}]", version));
    }
    if let Some(description) = summary.description.as_deref().filter(|d| !d.is_empty()) {
        line.push_str(&format!(" - {}", description));
    }
    line
}
