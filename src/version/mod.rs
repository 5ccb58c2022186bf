//! Semantic versions (SemVer 2.0.0) and npm-style version ranges.
//!
//! - `SemanticVersion` - strict parsing, canonical formatting and precedence
//! - `range` - `VersionRange` expressions and best-version selection
//! - `comparer` - string comparison with a configurable fallback policy

mod comparer;
mod range;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

pub use comparer::{FallbackPolicy, VersionComparer};
pub use range::{VersionRange, select_best_version, select_best_version_str};

/// Malformed version or range text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,
    #[error("invalid version '{0}': expected MAJOR.MINOR.PATCH")]
    Format(String),
    #[error("invalid numeric component '{0}'")]
    InvalidNumber(String),
    #[error("numeric component '{0}' has a leading zero")]
    LeadingZero(String),
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("invalid version range '{0}'")]
    InvalidRange(String),
}

/// One dot-separated element of a pre-release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Numeric(u64),
    AlphaNumeric(String),
}

impl Identifier {
    fn parse(s: &str) -> Result<Self, VersionError> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(VersionError::InvalidIdentifier(s.to_string()));
        }
        if s.chars().all(|c| c.is_ascii_digit()) {
            return parse_numeric(s).map(Identifier::Numeric);
        }
        Ok(Identifier::AlphaNumeric(s.to_string()))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Identifier::Numeric(a), Identifier::Numeric(b)) => a.cmp(b),
            (Identifier::Numeric(_), Identifier::AlphaNumeric(_)) => Ordering::Less,
            (Identifier::AlphaNumeric(_), Identifier::Numeric(_)) => Ordering::Greater,
            (Identifier::AlphaNumeric(a), Identifier::AlphaNumeric(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "{}", n),
            Identifier::AlphaNumeric(s) => f.write_str(s),
        }
    }
}

/// A parsed `MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]` version.
///
/// Build metadata is kept for display but ignored by equality, hashing and
/// ordering, so `1.0.0+a == 1.0.0+b`.
#[derive(Debug, Clone)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: Vec<Identifier>,
    pub build: Option<String>,
}

impl SemanticVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: Vec::new(),
            build: None,
        }
    }

    /// Parse a version string strictly.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VersionError::Empty);
        }

        let (rest, build) = match text.split_once('+') {
            Some((rest, build)) => {
                for part in build.split('.') {
                    if part.is_empty()
                        || !part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                    {
                        return Err(VersionError::InvalidIdentifier(part.to_string()));
                    }
                }
                (rest, Some(build.to_string()))
            }
            None => (text, None),
        };

        let (core, pre) = match rest.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (rest, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() != 3 {
            return Err(VersionError::Format(text.to_string()));
        }

        let pre_release = match pre {
            Some(pre) => pre
                .split('.')
                .map(Identifier::parse)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            major: parse_numeric(parts[0])?,
            minor: parse_numeric(parts[1])?,
            patch: parse_numeric(parts[2])?,
            pre_release,
            build,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre_release.is_empty()
    }

    pub fn triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }

    /// Same version with pre-release and build metadata removed.
    pub fn base(&self) -> Self {
        Self::new(self.major, self.minor, self.patch)
    }

    /// Lowest possible pre-release of a version (`X.Y.Z-0`), used as an
    /// exclusive upper bound so no pre-release of `X.Y.Z` slips under it.
    pub(crate) fn lowest_prerelease(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            pre_release: vec![Identifier::Numeric(0)],
            ..Self::new(major, minor, patch)
        }
    }
}

/// Parse `0` or a decimal without leading zeros.
fn parse_numeric(s: &str) -> Result<u64, VersionError> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return Err(VersionError::InvalidNumber(s.to_string()));
    }
    if s.len() > 1 && s.starts_with('0') {
        return Err(VersionError::LeadingZero(s.to_string()));
    }
    s.parse::<u64>()
        .map_err(|_| VersionError::InvalidNumber(s.to_string()))
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

impl Hash for SemanticVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.triple().hash(state);
        self.pre_release.hash(state);
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.triple()
            .cmp(&other.triple())
            .then_with(|| match (self.is_prerelease(), other.is_prerelease()) {
                (false, false) => Ordering::Equal,
                (false, true) => Ordering::Greater,
                (true, false) => Ordering::Less,
                // Vec ordering is element-wise with shorter-prefix-is-less
                (true, true) => self.pre_release.cmp(&other.pre_release),
            })
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.is_prerelease() {
            let pre: Vec<String> = self.pre_release.iter().map(|id| id.to_string()).collect();
            write!(f, "-{}", pre.join("."))?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl FromStr for SemanticVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> SemanticVersion {
        SemanticVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse_basic() {
        let version = v("1.2.3");
        assert_eq!(version.triple(), (1, 2, 3));
        assert!(!version.is_prerelease());
        assert_eq!(version.build, None);
    }

    #[test]
    fn test_parse_prerelease_and_build() {
        let version = v("1.0.0-alpha.1+build.5");
        assert_eq!(
            version.pre_release,
            vec![
                Identifier::AlphaNumeric("alpha".into()),
                Identifier::Numeric(1)
            ]
        );
        assert_eq!(version.build.as_deref(), Some("build.5"));
    }

    #[test]
    fn test_parse_hyphen_inside_prerelease() {
        let version = v("1.0.0-x-y-z.-");
        assert_eq!(
            version.pre_release,
            vec![
                Identifier::AlphaNumeric("x-y-z".into()),
                Identifier::AlphaNumeric("-".into())
            ]
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let cases = [
            "", "1", "1.2", "1.2.3.4", "01.2.3", "1.02.3", "1.2.03", "a.b.c", "1.2.3-",
            "1.2.3-01", "1.2.3-a..b", "1.2.3+", "1.2.3+a..b", "1.2.3-a_b", "-1.2.3",
        ];
        for case in cases {
            assert!(
                SemanticVersion::parse(case).is_err(),
                "expected '{}' to be rejected",
                case
            );
        }
    }

    #[test]
    fn test_parse_error_kinds() {
        assert_eq!(SemanticVersion::parse("  "), Err(VersionError::Empty));
        assert_eq!(
            SemanticVersion::parse("01.0.0"),
            Err(VersionError::LeadingZero("01".into()))
        );
        assert!(matches!(
            SemanticVersion::parse("1.2"),
            Err(VersionError::Format(_))
        ));
    }

    #[test]
    fn test_display_round_trip() {
        let cases = [
            "0.0.0",
            "1.2.3",
            "10.20.30",
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-0.3.7",
            "1.0.0-x.7.z.92",
            "1.0.0+20130313144700",
            "1.0.0-beta+exp.sha.5114f85",
        ];
        for case in cases {
            let parsed = v(case);
            let formatted = parsed.to_string();
            assert_eq!(formatted, case);
            assert_eq!(v(&formatted), parsed);
        }
    }

    #[test]
    fn test_release_greater_than_prerelease() {
        assert!(v("1.0.0") > v("1.0.0-alpha"));
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        assert!(v("1.0.0-alpha.1") < v("1.0.0-beta"));
    }

    #[test]
    fn test_semver_precedence_chain() {
        let chain = [
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-alpha.beta",
            "1.0.0-beta",
            "1.0.0-beta.2",
            "1.0.0-beta.11",
            "1.0.0-rc.1",
            "1.0.0",
            "1.0.1",
            "1.1.0",
            "2.0.0",
            "10.0.0",
        ];
        let parsed: Vec<SemanticVersion> = chain.iter().map(|s| v(s)).collect();
        for i in 0..parsed.len() {
            for j in 0..parsed.len() {
                assert_eq!(
                    parsed[i].cmp(&parsed[j]),
                    i.cmp(&j),
                    "{} vs {}",
                    chain[i],
                    chain[j]
                );
            }
        }
    }

    #[test]
    fn test_build_metadata_ignored() {
        assert_eq!(v("1.0.0+a"), v("1.0.0+b"));
        assert_eq!(v("1.0.0+a").cmp(&v("1.0.0")), Ordering::Equal);

        let mut set = std::collections::HashSet::new();
        set.insert(v("1.0.0+a"));
        assert!(set.contains(&v("1.0.0+zzz")));
    }

    #[test]
    fn test_numeric_identifiers_compare_numerically() {
        assert!(v("1.0.0-2") < v("1.0.0-10"));
        assert!(v("1.0.0-10") < v("1.0.0-a"));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&v("1.2.3-rc.1")).unwrap();
        assert_eq!(json, "\"1.2.3-rc.1\"");
        let back: SemanticVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("1.2.3-rc.1"));
        assert!(serde_json::from_str::<SemanticVersion>("\"nope\"").is_err());
    }

    #[test]
    fn test_lowest_prerelease_bound() {
        let bound = SemanticVersion::lowest_prerelease(2, 0, 0);
        assert_eq!(bound.to_string(), "2.0.0-0");
        assert!(bound < v("2.0.0-alpha"));
        assert!(bound > v("1.99.99"));
    }
}
