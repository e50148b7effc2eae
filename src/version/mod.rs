// src/version/mod.rs

//! Package version parsing and comparison
//!
//! Versions follow the pacman triple: an integer epoch, a dot-separated
//! pkgver, and a dot-separated pkgrel. Two source shapes are supported:
//!
//! - build-script text (PKGBUILD or .SRCINFO `key=value` lines), via
//!   [`PkgVersion::from_script`]
//! - published `[epoch:]ver-rel` strings from the repository database, via
//!   [`PkgVersion::parse`]
//!
//! # Ordering
//!
//! Comparison is epoch first, then the release sequence, then the revision
//! sequence, lexicographic over components. How individual components
//! compare is an explicit [`ComparePolicy`]: the historical behavior
//! compares components as raw strings (so `"10" < "9"`), which is kept as
//! the default rather than silently corrected. `NumericAware` is available
//! for callers that want `"10" > "9"` when both sides are integers.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// How version components are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComparePolicy {
    /// Raw string ordering per component. Multi-digit components compare
    /// incorrectly (`"10" < "9"`) but this matches the published history
    /// of the repositories this tool maintains.
    #[default]
    Lexical,
    /// Components that both parse as integers compare numerically;
    /// anything else falls back to string ordering.
    NumericAware,
}

/// A parsed package version triple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PkgVersion {
    pub epoch: u64,
    pub release: Vec<String>,
    pub revision: Vec<String>,
}

impl PkgVersion {
    /// Extract a version from build-script text (PKGBUILD or .SRCINFO)
    ///
    /// Scans `key=value` / `key = value` lines for `pkgver`, `pkgrel`, and
    /// `epoch`. `pkgver` is mandatory; `pkgrel` defaults to `"1"` and
    /// `epoch` to `0`. The first occurrence of each key wins.
    pub fn from_script(text: &str) -> Result<Self> {
        let mut pkgver: Option<&str> = None;
        let mut pkgrel: Option<&str> = None;
        let mut epoch: Option<&str> = None;

        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "pkgver" if pkgver.is_none() => pkgver = Some(value),
                "pkgrel" if pkgrel.is_none() => pkgrel = Some(value),
                "epoch" if epoch.is_none() => epoch = Some(value),
                _ => {}
            }
        }

        let release = pkgver
            .ok_or_else(|| Error::MalformedVersion("pkgver keyword not found".to_string()))?;
        let revision = pkgrel.unwrap_or("1");
        let epoch = match epoch {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| Error::MalformedVersion(format!("invalid epoch '{raw}': {e}")))?,
            None => 0,
        };

        Ok(Self {
            epoch,
            release: split_components(release),
            revision: split_components(revision),
        })
    }

    /// Parse a published version string
    ///
    /// Format: `[epoch:]ver[-rel]`. Examples:
    /// - `"1.2.3-1"` → epoch=0, release=[1,2,3], revision=[1]
    /// - `"2:1.2-4"` → epoch=2, release=[1,2], revision=[4]
    /// - `"1.2.3"` → revision defaults to [1]
    pub fn parse(s: &str) -> Result<Self> {
        let (epoch_str, rest) = match s.split_once(':') {
            Some((e, r)) => (e, r),
            None => ("0", s),
        };

        let epoch = if epoch_str.is_empty() {
            0
        } else {
            epoch_str
                .parse::<u64>()
                .map_err(|e| Error::MalformedVersion(format!("invalid epoch in '{s}': {e}")))?
        };

        let (release, revision) = match rest.split_once('-') {
            Some((v, r)) => (v, r),
            None => (rest, "1"),
        };

        if release.is_empty() {
            return Err(Error::MalformedVersion(format!(
                "empty version component in '{s}'"
            )));
        }

        Ok(Self {
            epoch,
            release: split_components(release),
            revision: split_components(revision),
        })
    }

    /// Compare two versions under the given component policy
    ///
    /// Never fails; defines a total order.
    pub fn cmp_with(&self, other: &PkgVersion, policy: ComparePolicy) -> Ordering {
        match self.epoch.cmp(&other.epoch) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match cmp_components(&self.release, &other.release, policy) {
            Ordering::Equal => {}
            ord => return ord,
        }

        cmp_components(&self.revision, &other.revision, policy)
    }
}

fn split_components(s: &str) -> Vec<String> {
    s.split('.').map(|c| c.to_string()).collect()
}

/// Lexicographic sequence comparison with a per-component policy
fn cmp_components(a: &[String], b: &[String], policy: ComparePolicy) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = match policy {
            ComparePolicy::Lexical => x.cmp(y),
            ComparePolicy::NumericAware => match (x.parse::<u64>(), y.parse::<u64>()) {
                (Ok(n), Ok(m)) => n.cmp(&m),
                _ => x.cmp(y),
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

impl Ord for PkgVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_with(other, ComparePolicy::Lexical)
    }
}

impl PartialOrd for PkgVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PkgVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}-{}", self.release.join("."), self.revision.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_script_full() {
        let v =
            PkgVersion::from_script("pkgname=foo\npkgver=1.2.3\npkgrel=2\nepoch=1\n").unwrap();
        assert_eq!(v.epoch, 1);
        assert_eq!(v.release, vec!["1", "2", "3"]);
        assert_eq!(v.revision, vec!["2"]);
    }

    #[test]
    fn test_from_script_srcinfo_spacing() {
        let v = PkgVersion::from_script("\tpkgver = 8.5\n\tpkgrel = 1\n").unwrap();
        assert_eq!(v.release, vec!["8", "5"]);
        assert_eq!(v.revision, vec!["1"]);
    }

    #[test]
    fn test_from_script_defaults() {
        let v = PkgVersion::from_script("pkgver=2.0\n").unwrap();
        assert_eq!(v.epoch, 0);
        assert_eq!(v.revision, vec!["1"]);
    }

    #[test]
    fn test_from_script_missing_pkgver() {
        let err = PkgVersion::from_script("pkgrel=1\n").unwrap_err();
        assert!(matches!(err, Error::MalformedVersion(_)));
    }

    #[test]
    fn test_from_script_bad_epoch() {
        let err = PkgVersion::from_script("pkgver=1.0\nepoch=banana\n").unwrap_err();
        assert!(matches!(err, Error::MalformedVersion(_)));
    }

    #[test]
    fn test_parse_published() {
        let v = PkgVersion::parse("2:1.2-4").unwrap();
        assert_eq!(v.epoch, 2);
        assert_eq!(v.release, vec!["1", "2"]);
        assert_eq!(v.revision, vec!["4"]);
    }

    #[test]
    fn test_parse_default_revision() {
        let v = PkgVersion::parse("1.2.3").unwrap();
        assert_eq!(v.revision, vec!["1"]);
    }

    #[test]
    fn test_parse_empty_release() {
        assert!(PkgVersion::parse("2:").is_err());
    }

    #[test]
    fn test_epoch_dominates() {
        let a = PkgVersion::parse("1:1.0-1").unwrap();
        let b = PkgVersion::parse("9.9-9").unwrap();
        assert!(a > b);
    }

    #[test]
    fn test_revision_breaks_ties() {
        let a = PkgVersion::parse("1.2.3-1").unwrap();
        let b = PkgVersion::parse("1.2.3-2").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_reflexive_and_antisymmetric() {
        let a = PkgVersion::parse("1.2.3-1").unwrap();
        let b = PkgVersion::parse("1.2.4-1").unwrap();
        assert_eq!(a.cmp(&a), Ordering::Equal);
        assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
    }

    #[test]
    fn test_prefix_sequence_is_smaller() {
        let a = PkgVersion::parse("1.2-1").unwrap();
        let b = PkgVersion::parse("1.2.0-1").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_lexical_multi_digit_quirk() {
        // Documented historical behavior: components compare as strings.
        let a = PkgVersion::parse("1.10-1").unwrap();
        let b = PkgVersion::parse("1.9-1").unwrap();
        assert!(a < b);
        assert_eq!(
            a.cmp_with(&b, ComparePolicy::NumericAware),
            Ordering::Greater
        );
    }

    #[test]
    fn test_equality_is_stringwise() {
        // "01" and "1" are distinct components even though numerically equal.
        let a = PkgVersion::parse("1.01-1").unwrap();
        let b = PkgVersion::parse("1.1-1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        assert_eq!(PkgVersion::parse("1.2.3-1").unwrap().to_string(), "1.2.3-1");
        assert_eq!(PkgVersion::parse("2:1.2-4").unwrap().to_string(), "2:1.2-4");
    }
}
