//! npm-style version ranges.
//!
//! A range is a union (`||`) of comparator sets. Every sugar form (`^`, `~`,
//! X-ranges, hyphen ranges, partial versions) is desugared at parse time into
//! primitive comparators, so matching only ever deals with `(op, version)`.

use std::fmt;
use std::str::FromStr;

use super::{Identifier, SemanticVersion, VersionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: SemanticVersion,
}

impl Comparator {
    fn new(op: Op, version: SemanticVersion) -> Self {
        Self { op, version }
    }

    fn matches(&self, version: &SemanticVersion) -> bool {
        match self.op {
            Op::Lt => version < &self.version,
            Op::Le => version <= &self.version,
            Op::Gt => version > &self.version,
            Op::Ge => version >= &self.version,
            Op::Eq => version == &self.version,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Eq => "=",
        };
        write!(f, "{}{}", op, self.version)
    }
}

/// A version with possibly missing (wildcard) components.
#[derive(Debug, Clone, Default)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre_release: Vec<Identifier>,
}

impl Partial {
    fn parse(text: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidRange(text.to_string());

        let s = text.trim();
        let s = s.strip_prefix('=').unwrap_or(s);
        let s = s
            .strip_prefix('v')
            .or_else(|| s.strip_prefix('V'))
            .unwrap_or(s);
        if s.is_empty() {
            return Ok(Self::default());
        }

        let core = s.split_once('+').map_or(s, |(core, _)| core);
        let (numbers, pre) = match core.split_once('-') {
            Some((numbers, _)) => (numbers, true),
            None => (core, false),
        };
        if numbers.split('.').count() == 3 && !numbers.contains(['x', 'X', '*']) {
            let full = SemanticVersion::parse(core).map_err(|_| invalid())?;
            return Ok(Self {
                major: Some(full.major),
                minor: Some(full.minor),
                patch: Some(full.patch),
                pre_release: full.pre_release,
            });
        }
        // A pre-release only makes sense on a complete version
        if pre {
            return Err(invalid());
        }

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.len() > 3 {
            return Err(invalid());
        }

        let mut components = [None, None, None];
        let mut wildcard_seen = false;
        for (slot, part) in components.iter_mut().zip(&parts) {
            if matches!(*part, "x" | "X" | "*") {
                wildcard_seen = true;
                continue;
            }
            if wildcard_seen {
                return Err(invalid());
            }
            let number = super::parse_numeric(part).map_err(|_| invalid())?;
            *slot = Some(number);
        }

        Ok(Self {
            major: components[0],
            minor: components[1],
            patch: components[2],
            pre_release: Vec::new(),
        })
    }

    fn full(&self) -> Option<SemanticVersion> {
        Some(SemanticVersion {
            pre_release: self.pre_release.clone(),
            ..SemanticVersion::new(self.major?, self.minor?, self.patch?)
        })
    }

    /// Lower bound with wildcards zeroed.
    fn floor(&self) -> SemanticVersion {
        self.full().unwrap_or_else(|| {
            SemanticVersion::new(
                self.major.unwrap_or(0),
                self.minor.unwrap_or(0),
                self.patch.unwrap_or(0),
            )
        })
    }
}

fn below(major: u64, minor: u64, patch: u64) -> Comparator {
    Comparator::new(Op::Lt, SemanticVersion::lowest_prerelease(major, minor, patch))
}

fn nothing() -> Vec<Comparator> {
    vec![below(0, 0, 0)]
}

/// Successor of a range component; `None` when the component is `u64::MAX`.
fn succ(n: u64) -> Option<u64> {
    n.checked_add(1)
}

// The desugaring helpers return `None` when an exclusive upper bound
// would overflow `u64`.

fn x_range(op: &str, p: &Partial) -> Option<Vec<Comparator>> {
    let (Some(major), minor) = (p.major, p.minor) else {
        return Some(match op {
            "<" | ">" => nothing(),
            _ => Vec::new(),
        });
    };

    if let Some(full) = p.full() {
        let op = match op {
            "<" => Op::Lt,
            "<=" => Op::Le,
            ">" => Op::Gt,
            ">=" => Op::Ge,
            _ => Op::Eq,
        };
        return Some(vec![Comparator::new(op, full)]);
    }

    // Exclusive upper bound of the wildcard block, e.g. 1.2.x -> 1.3.0-0
    let next = match minor {
        None => (succ(major)?, 0, 0),
        Some(minor) => (major, succ(minor)?, 0),
    };

    Some(match op {
        ">" => vec![Comparator::new(
            Op::Ge,
            SemanticVersion::new(next.0, next.1, next.2),
        )],
        ">=" => vec![Comparator::new(Op::Ge, p.floor())],
        "<" => vec![below(major, minor.unwrap_or(0), 0)],
        "<=" => vec![below(next.0, next.1, next.2)],
        _ => vec![
            Comparator::new(Op::Ge, p.floor()),
            below(next.0, next.1, next.2),
        ],
    })
}

fn tilde(p: &Partial) -> Option<Vec<Comparator>> {
    Some(match (p.major, p.minor) {
        (None, _) => Vec::new(),
        (Some(major), None) => vec![
            Comparator::new(Op::Ge, p.floor()),
            below(succ(major)?, 0, 0),
        ],
        (Some(major), Some(minor)) => vec![
            Comparator::new(Op::Ge, p.floor()),
            below(major, succ(minor)?, 0),
        ],
    })
}

fn caret(p: &Partial) -> Option<Vec<Comparator>> {
    let Some(major) = p.major else {
        return Some(Vec::new());
    };
    let upper = match (major, p.minor, p.patch) {
        (0, Some(0), Some(patch)) => below(0, 0, succ(patch)?),
        (0, Some(minor), _) => below(0, succ(minor)?, 0),
        (major, _, _) => below(succ(major)?, 0, 0),
    };
    Some(vec![Comparator::new(Op::Ge, p.floor()), upper])
}

fn hyphen(from: &Partial, to: &Partial) -> Option<Vec<Comparator>> {
    let mut set = Vec::new();
    if from.major.is_some() {
        set.push(Comparator::new(Op::Ge, from.floor()));
    }
    match (to.major, to.minor, to.full()) {
        (None, _, _) => {}
        (Some(_), _, Some(full)) => set.push(Comparator::new(Op::Le, full)),
        (Some(major), None, None) => set.push(below(succ(major)?, 0, 0)),
        (Some(major), Some(minor), None) => set.push(below(major, succ(minor)?, 0)),
    }
    Some(set)
}

const OPERATORS: [&str; 8] = ["~>", "<=", ">=", "^", "~", "<", ">", "="];

fn parse_comparator(token: &str) -> Result<Vec<Comparator>, VersionError> {
    let (op, rest) = OPERATORS
        .iter()
        .find_map(|op| token.strip_prefix(*op).map(|rest| (*op, rest)))
        .unwrap_or(("", token));

    let partial = Partial::parse(rest)?;
    match op {
        "^" => caret(&partial),
        "~" | "~>" => tilde(&partial),
        op => x_range(op, &partial),
    }
    .ok_or_else(|| VersionError::InvalidRange(token.to_string()))
}

fn parse_set(text: &str) -> Result<Vec<Comparator>, VersionError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();

    if tokens.len() == 3 && tokens[1] == "-" {
        return hyphen(&Partial::parse(tokens[0])?, &Partial::parse(tokens[2])?)
            .ok_or_else(|| VersionError::InvalidRange(text.to_string()));
    }

    let mut set = Vec::new();
    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        // Allow whitespace between an operator and its version (">= 1.2.0")
        let token = if OPERATORS.contains(&token) {
            let version = iter
                .next()
                .ok_or_else(|| VersionError::InvalidRange(text.to_string()))?;
            format!("{}{}", token, version)
        } else {
            token.to_string()
        };
        set.extend(parse_comparator(&token)?);
    }
    Ok(set)
}

/// A predicate over versions plus highest-match selection.
#[derive(Debug, Clone)]
pub struct VersionRange {
    source: String,
    sets: Vec<Vec<Comparator>>,
}

impl VersionRange {
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let sets = text
            .split("||")
            .map(parse_set)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: text.trim().to_string(),
            sets,
        })
    }

    /// Range matching every release version.
    pub fn any() -> Self {
        Self {
            source: "*".to_string(),
            sets: vec![Vec::new()],
        }
    }

    /// Range matching exactly one version.
    pub fn exact(version: &SemanticVersion) -> Self {
        Self {
            source: version.to_string(),
            sets: vec![vec![Comparator::new(Op::Eq, version.clone())]],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `version` satisfies any comparator set.
    ///
    /// Pre-releases only match a set that mentions a pre-release of the same
    /// `major.minor.patch`, so `^1.2.0` never picks `1.3.0-beta`.
    pub fn matches(&self, version: &SemanticVersion) -> bool {
        self.sets.iter().any(|set| {
            if !set.iter().all(|c| c.matches(version)) {
                return false;
            }
            if !version.is_prerelease() {
                return true;
            }
            set.iter().any(|c| {
                c.version.is_prerelease() && c.version.triple() == version.triple()
            })
        })
    }

    /// Like [`matches`](Self::matches) for unparsed text; unparsable text never matches.
    pub fn matches_str(&self, version: &str) -> bool {
        SemanticVersion::parse(version)
            .map(|v| self.matches(&v))
            .unwrap_or(false)
    }

    /// Desugared form, e.g. `^1.2.0` -> `>=1.2.0 <2.0.0-0`.
    pub fn normalized(&self) -> String {
        self.sets
            .iter()
            .map(|set| {
                if set.is_empty() {
                    "*".to_string()
                } else {
                    set.iter()
                        .map(|c| c.to_string())
                        .collect::<Vec<_>>()
                        .join(" ")
                }
            })
            .collect::<Vec<_>>()
            .join(" || ")
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Highest candidate satisfying `range`, returned as the original string.
///
/// Candidates that do not parse are skipped rather than failing the selection.
pub fn select_best_version<S: AsRef<str>>(range: &VersionRange, candidates: &[S]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|candidate| {
            let text = candidate.as_ref();
            SemanticVersion::parse(text)
                .ok()
                .filter(|version| range.matches(version))
                .map(|version| (version, text))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, text)| text.to_string())
}

/// Parse `range` and select from `candidates`.
pub fn select_best_version_str<S: AsRef<str>>(
    range: &str,
    candidates: &[S],
) -> Result<Option<String>, VersionError> {
    let range = VersionRange::parse(range)?;
    Ok(select_best_version(&range, candidates))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> SemanticVersion {
        SemanticVersion::parse(s).unwrap()
    }

    fn r(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    fn assert_range(range: &str, yes: &[&str], no: &[&str]) {
        let parsed = r(range);
        for version in yes {
            assert!(
                parsed.matches(&v(version)),
                "expected {} to satisfy '{}' ({})",
                version,
                range,
                parsed.normalized()
            );
        }
        for version in no {
            assert!(
                !parsed.matches(&v(version)),
                "expected {} not to satisfy '{}' ({})",
                version,
                range,
                parsed.normalized()
            );
        }
    }

    #[test]
    fn test_select_best_caret() {
        let best = select_best_version_str("^1.2.0", &["1.2.0", "1.3.0", "2.0.0"]).unwrap();
        assert_eq!(best.as_deref(), Some("1.3.0"));
    }

    #[test]
    fn test_select_best_empty_candidates() {
        let empty: [&str; 0] = [];
        assert_eq!(select_best_version(&r("^1.0.0"), &empty), None);
        assert_eq!(select_best_version(&VersionRange::any(), &empty), None);
    }

    #[test]
    fn test_select_best_skips_unparsable() {
        let candidates = ["1.0.0", "garbage", "1.4.0", "1.5", "v1.9.0"];
        assert_eq!(
            select_best_version(&r("^1.0.0"), &candidates).as_deref(),
            Some("1.4.0")
        );
    }

    #[test]
    fn test_select_best_no_match() {
        assert_eq!(
            select_best_version(&r(">=3.0.0"), &["1.0.0", "2.0.0"]),
            None
        );
    }

    #[test]
    fn test_select_best_returns_original_text() {
        let best = select_best_version(&r("1.x"), &["1.0.0+build.1", "1.0.0-rc.1"]);
        assert_eq!(best.as_deref(), Some("1.0.0+build.1"));
    }

    #[test]
    fn test_caret_ranges() {
        assert_range("^1.2.3", &["1.2.3", "1.9.9"], &["1.2.2", "2.0.0", "2.0.0-alpha"]);
        assert_range("^0.2.3", &["0.2.3", "0.2.9"], &["0.3.0", "0.2.2"]);
        assert_range("^0.0.3", &["0.0.3"], &["0.0.4", "0.0.2"]);
        assert_range("^1.2", &["1.2.0", "1.9.0"], &["2.0.0", "1.1.9"]);
        assert_range("^0.0", &["0.0.0", "0.0.9"], &["0.1.0"]);
        assert_range("^1.x", &["1.0.0", "1.5.5"], &["2.0.0", "0.9.9"]);
    }

    #[test]
    fn test_tilde_ranges() {
        assert_range("~1.2.3", &["1.2.3", "1.2.9"], &["1.3.0", "1.2.2"]);
        assert_range("~1.2", &["1.2.0", "1.2.9"], &["1.3.0"]);
        assert_range("~1", &["1.0.0", "1.9.0"], &["2.0.0"]);
        assert_range("~> 1.2.3", &["1.2.4"], &["1.3.0"]);
    }

    #[test]
    fn test_x_ranges() {
        assert_range("*", &["0.0.0", "99.0.0"], &["1.0.0-alpha"]);
        assert_range("", &["1.0.0"], &[]);
        assert_range("1.x", &["1.0.0", "1.9.9"], &["2.0.0", "0.9.0"]);
        assert_range("1.2.*", &["1.2.0", "1.2.7"], &["1.3.0"]);
        assert_range("1", &["1.0.0", "1.4.0"], &["2.0.0"]);
    }

    #[test]
    fn test_primitive_comparators() {
        assert_range(">=1.2.0 <1.4.0", &["1.2.0", "1.3.9"], &["1.4.0", "1.1.0"]);
        assert_range(">1.2", &["1.3.0"], &["1.2.9"]);
        assert_range("<=1.2", &["1.2.9"], &["1.3.0"]);
        assert_range("<1.2", &["1.1.9"], &["1.2.0"]);
        assert_range(">= 1.0.0", &["1.0.0"], &["0.9.0"]);
        assert_range("=1.0.0", &["1.0.0"], &["1.0.1"]);
        assert_range("v1.0.0", &["1.0.0"], &["1.0.1"]);
        assert_range("<*", &[], &["0.0.0", "1.0.0"]);
    }

    #[test]
    fn test_hyphen_ranges() {
        assert_range("1.2.3 - 2.3.4", &["1.2.3", "2.3.4"], &["2.3.5", "1.2.2"]);
        assert_range("1.2 - 2.3", &["1.2.0", "2.3.9"], &["2.4.0", "1.1.9"]);
    }

    #[test]
    fn test_union_ranges() {
        assert_range("^1.0.0 || ^3.0.0", &["1.2.0", "3.1.0"], &["2.0.0", "4.0.0"]);
        assert_eq!(
            select_best_version(&r("^1.0.0 || ^3.0.0"), &["1.5.0", "2.0.0", "3.2.0", "4.0.0"])
                .as_deref(),
            Some("3.2.0")
        );
    }

    #[test]
    fn test_prerelease_requires_matching_tuple() {
        assert_range(
            ">=1.2.3-beta.1 <2.0.0",
            &["1.2.3-beta.2", "1.2.3", "1.5.0"],
            &["1.2.4-alpha", "1.2.3-alpha"],
        );
        assert_range("1.0.0-rc.1", &["1.0.0-rc.1"], &["1.0.0-rc.2", "1.0.0"]);
    }

    #[test]
    fn test_exact_and_any_constructors() {
        let exact = VersionRange::exact(&v("2.1.0"));
        assert!(exact.matches(&v("2.1.0")));
        assert!(!exact.matches(&v("2.1.1")));
        assert!(VersionRange::any().matches(&v("5.0.0")));
    }

    #[test]
    fn test_invalid_ranges() {
        for bad in [">=", "1.2.3.4", "abc", "^x.1", "1.x.3", "^", "1.2.3 - "] {
            assert!(VersionRange::parse(bad).is_err(), "expected '{}' to fail", bad);
        }
    }

    #[test]
    fn test_unbounded_component_is_invalid() {
        for bad in [
            "^18446744073709551615.0.0",
            "~1.18446744073709551615",
            "^0.0.18446744073709551615",
            "18446744073709551615.x",
            "1.0.0 - 18446744073709551615",
        ] {
            assert!(
                matches!(VersionRange::parse(bad), Err(VersionError::InvalidRange(_))),
                "expected '{}' to be rejected",
                bad
            );
        }
        assert!(select_best_version_str("~1.18446744073709551615", &["1.0.0"]).is_err());

        // A full version needs no upper bound
        assert_range(">=18446744073709551615.0.0", &["18446744073709551615.0.0"], &["1.0.0"]);
    }

    #[test]
    fn test_normalized_form() {
        assert_eq!(r("^1.2.0").normalized(), ">=1.2.0 <2.0.0-0");
        assert_eq!(r("~1.2").normalized(), ">=1.2.0 <1.3.0-0");
        assert_eq!(r("*").normalized(), "*");
    }

    #[test]
    fn test_matches_str() {
        let range = r("^1.0.0");
        assert!(range.matches_str("1.1.0"));
        assert!(!range.matches_str("not-a-version"));
    }
}
