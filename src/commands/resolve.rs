use anyhow::{Result, bail};

use crate::error::PackageError;
use crate::version::select_best_version_str;

/// Print the highest of `candidates` satisfying `range`. Works offline.
pub fn resolve(range: &str, candidates: &[String]) -> Result<()> {
    println!("{}", run(range, candidates)?);
    Ok(())
}

fn run(range: &str, candidates: &[String]) -> Result<String> {
    match select_best_version_str(range, candidates).map_err(PackageError::from)? {
        Some(best) => Ok(best),
        None => bail!("no candidate satisfies '{}'", range),
    }
}
