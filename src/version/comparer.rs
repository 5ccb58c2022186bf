//! Ordering of raw version strings.

use std::cmp::Ordering;

use super::{SemanticVersion, VersionError};

/// What to do when a version string does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Surface the parse error.
    Strict,
    /// Order unparsable strings after every valid version, byte-wise
    /// among themselves.
    #[default]
    Lexical,
}

/// Compares version strings by SemVer precedence.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionComparer {
    policy: FallbackPolicy,
}

impl VersionComparer {
    pub fn new(policy: FallbackPolicy) -> Self {
        Self { policy }
    }

    pub fn strict() -> Self {
        Self::new(FallbackPolicy::Strict)
    }

    pub fn lexical() -> Self {
        Self::new(FallbackPolicy::Lexical)
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// Total order shared by `sort`, `max` and `is_newer`.
    pub fn compare(&self, a: &str, b: &str) -> Result<Ordering, VersionError> {
        match (SemanticVersion::parse(a), SemanticVersion::parse(b)) {
            (Ok(x), Ok(y)) => Ok(x.cmp(&y)),
            (Err(e), _) | (_, Err(e)) if self.policy == FallbackPolicy::Strict => Err(e),
            (Ok(_), Err(_)) => Ok(Ordering::Less),
            (Err(_), Ok(_)) => Ok(Ordering::Greater),
            (Err(_), Err(_)) => Ok(a.cmp(b)),
        }
    }

    /// Sort ascending. Under `Strict`, fails before touching `versions` if
    /// any entry does not parse.
    pub fn sort(&self, versions: &mut [String]) -> Result<(), VersionError> {
        if self.policy == FallbackPolicy::Strict {
            for version in versions.iter() {
                SemanticVersion::parse(version)?;
            }
        }
        versions.sort_by(|a, b| self.compare(a, b).unwrap_or(Ordering::Equal));
        Ok(())
    }

    /// Greatest version under this comparer, `None` for an empty slice.
    pub fn max<'a, S: AsRef<str>>(&self, versions: &'a [S]) -> Result<Option<&'a str>, VersionError> {
        let mut best: Option<&'a str> = None;
        for version in versions {
            let version = version.as_ref();
            best = match best {
                None => {
                    if self.policy == FallbackPolicy::Strict {
                        SemanticVersion::parse(version)?;
                    }
                    Some(version)
                }
                Some(current) => match self.compare(version, current)? {
                    Ordering::Greater => Some(version),
                    _ => Some(current),
                },
            };
        }
        Ok(best)
    }

    /// `true` when `candidate` is strictly newer than `current`.
    pub fn is_newer(&self, candidate: &str, current: &str) -> Result<bool, VersionError> {
        Ok(self.compare(candidate, current)? == Ordering::Greater)
    }
}
