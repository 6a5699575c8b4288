//! Union-of-half-open-intervals version ranges.

use std::fmt;

use anyhow::{bail, Result};
use semver::{BuildMetadata, Prerelease, Version};

/// A single `[lo, hi)` interval, or `[lo, hi]` when `hi_inclusive` is set
/// (used for `=V` equality, where `hi == lo`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub lo: Version,
    pub hi: Option<Version>,
    pub hi_inclusive: bool,
}

impl Interval {
    fn unbounded_from(lo: Version) -> Self {
        Interval {
            lo,
            hi: None,
            hi_inclusive: false,
        }
    }

    fn exact(v: Version) -> Self {
        Interval {
            lo: v.clone(),
            hi: Some(v),
            hi_inclusive: true,
        }
    }

    fn bounded(lo: Version, hi: Version) -> Self {
        Interval {
            lo,
            hi: Some(hi),
            hi_inclusive: false,
        }
    }

    pub fn contains(&self, v: &Version) -> bool {
        if v < &self.lo {
            return false;
        }
        match &self.hi {
            None => true,
            Some(hi) => {
                if self.hi_inclusive {
                    v <= hi
                } else {
                    v < hi
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        match &self.hi {
            None => false,
            Some(hi) => {
                if self.hi_inclusive {
                    &self.lo > hi
                } else {
                    &self.lo >= hi
                }
            }
        }
    }

    fn intersect(&self, other: &Interval) -> Option<Interval> {
        let lo = if self.lo >= other.lo {
            self.lo.clone()
        } else {
            other.lo.clone()
        };
        let (hi, hi_inclusive) = match (&self.hi, &other.hi) {
            (None, None) => (None, false),
            (Some(h), None) => (Some(h.clone()), self.hi_inclusive),
            (None, Some(h)) => (Some(h.clone()), other.hi_inclusive),
            (Some(a), Some(b)) => {
                if a < b {
                    (Some(a.clone()), self.hi_inclusive)
                } else if b < a {
                    (Some(b.clone()), other.hi_inclusive)
                } else {
                    (Some(a.clone()), self.hi_inclusive && other.hi_inclusive)
                }
            }
        };
        let interval = Interval {
            lo,
            hi,
            hi_inclusive,
        };
        if interval.is_empty() {
            None
        } else {
            Some(interval)
        }
    }

    /// Two intervals can be merged into one iff they overlap or touch
    /// exactly at a shared, compatible boundary.
    fn merge(&self, other: &Interval) -> Option<Interval> {
        let (first, second) = if self.lo <= other.lo {
            (self, other)
        } else {
            (other, self)
        };
        let adjoins = match &first.hi {
            None => true,
            Some(hi) => {
                if first.hi_inclusive {
                    hi >= &second.lo
                } else {
                    hi >= &second.lo
                }
            }
        };
        if !adjoins {
            return None;
        }
        let (hi, hi_inclusive) = match (&first.hi, &second.hi) {
            (None, _) | (_, None) => (None, false),
            (Some(a), Some(b)) => {
                if a > b {
                    (Some(a.clone()), first.hi_inclusive)
                } else if b > a {
                    (Some(b.clone()), second.hi_inclusive)
                } else {
                    (Some(a.clone()), first.hi_inclusive || second.hi_inclusive)
                }
            }
        };
        Some(Interval {
            lo: first.lo.clone(),
            hi,
            hi_inclusive,
        })
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hi {
            None => write!(f, ">={}", self.lo),
            Some(hi) if self.hi_inclusive => write!(f, "[{}, {}]", self.lo, hi),
            Some(hi) => write!(f, "[{}, {})", self.lo, hi),
        }
    }
}

/// A normalized union of disjoint, sorted intervals. An empty vector is
/// the empty range (matches nothing); `VersionRange::unrestricted()` is
/// the single interval `[0.0.0, +inf)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionRange {
    intervals: Vec<Interval>,
}

impl VersionRange {
    pub fn empty() -> Self {
        VersionRange { intervals: vec![] }
    }

    pub fn unrestricted() -> Self {
        VersionRange {
            intervals: vec![Interval::unbounded_from(Version::new(0, 0, 0))],
        }
    }

    pub fn exact(v: Version) -> Self {
        VersionRange {
            intervals: vec![Interval::exact(v)],
        }
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn contains(&self, v: &Version) -> bool {
        self.intervals.iter().any(|i| i.contains(v))
    }

    /// Highest version in `candidates` that this range contains. Used for
    /// "latest compatible" selection.
    pub fn max_satisfying<'a>(&self, candidates: impl IntoIterator<Item = &'a Version>) -> Option<&'a Version> {
        candidates
            .into_iter()
            .filter(|v| self.contains(v))
            .max()
    }

    pub fn intersect(&self, other: &VersionRange) -> VersionRange {
        let mut out = Vec::new();
        for a in &self.intervals {
            for b in &other.intervals {
                if let Some(i) = a.intersect(b) {
                    out.push(i);
                }
            }
        }
        normalize(out)
    }

    pub fn union<'a>(ranges: impl IntoIterator<Item = &'a VersionRange>) -> VersionRange {
        let mut all = Vec::new();
        for r in ranges {
            all.extend(r.intervals.iter().cloned());
        }
        normalize(all)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.intervals.is_empty() {
            return write!(f, "<empty>");
        }
        let parts: Vec<String> = self.intervals.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", parts.join(" || "))
    }
}

fn normalize(mut intervals: Vec<Interval>) -> VersionRange {
    intervals.retain(|i| !i.is_empty());
    intervals.sort_by(|a, b| a.lo.cmp(&b.lo));
    let mut merged: Vec<Interval> = Vec::new();
    for interval in intervals {
        if let Some(last) = merged.last_mut() {
            if let Some(m) = last.merge(&interval) {
                *last = m;
                continue;
            }
        }
        merged.push(interval);
    }
    VersionRange { intervals: merged }
}

fn bump(v: &Version, component: usize) -> Version {
    match component {
        0 => Version::new(v.major + 1, 0, 0),
        1 => Version::new(v.major, v.minor + 1, 0),
        _ => Version::new(v.major, v.minor, v.patch + 1),
    }
}

fn base(major: u64, minor: u64, patch: u64) -> Version {
    Version {
        major,
        minor,
        patch,
        pre: Prerelease::EMPTY,
        build: BuildMetadata::EMPTY,
    }
}

struct Parts {
    major: u64,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Prerelease,
}

fn parse_parts(s: &str) -> Result<Parts> {
    let (numeric, pre) = match s.split_once('-') {
        Some((n, p)) => (n, Prerelease::new(p)?),
        None => (s, Prerelease::EMPTY),
    };
    let mut comps = numeric.split('.');
    let major = comps
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty version component in `{s}`"))?;
    let major = parse_component(major)?;
    let minor = comps.next().map(parse_component).transpose()?;
    let patch = comps.next().map(parse_component).transpose()?;
    if comps.next().is_some() {
        bail!("too many version components in `{s}`");
    }
    Ok(Parts {
        major,
        minor,
        patch,
        pre,
    })
}

fn parse_component(s: &str) -> Result<u64> {
    if s.len() > 1 && s.starts_with('0') {
        bail!("leading zero in version component `{s}`");
    }
    s.parse::<u64>()
        .map_err(|e| anyhow::anyhow!("invalid version component `{s}`: {e}"))
}

/// Parse one comma-separated specifier list into the union of its ranges.
pub fn parse_range(s: &str) -> Result<VersionRange> {
    let s = s.trim();
    if s.is_empty() || s == "*" {
        return Ok(VersionRange::unrestricted());
    }
    let mut pieces = Vec::new();
    for part in s.split(',') {
        pieces.push(parse_specifier(part.trim())?);
    }
    Ok(VersionRange::union(pieces.iter()))
}

fn parse_specifier(s: &str) -> Result<VersionRange> {
    if let Some((a, b)) = split_hyphen(s) {
        return parse_hyphen(a, b);
    }
    if let Some(rest) = s.strip_prefix('^') {
        return parse_caret(rest);
    }
    if let Some(rest) = s.strip_prefix('~') {
        return parse_tilde(rest);
    }
    if let Some(rest) = s.strip_prefix(">=") {
        let v = version_with_default_pre(rest.trim())?;
        return Ok(VersionRange {
            intervals: vec![Interval::unbounded_from(v)],
        });
    }
    if let Some(rest) = s.strip_prefix('<') {
        let v = version_with_default_pre(rest.trim())?;
        return Ok(VersionRange {
            intervals: vec![Interval {
                lo: base(0, 0, 0),
                hi: Some(v),
                hi_inclusive: false,
            }],
        });
    }
    if let Some(rest) = s.strip_prefix('=') {
        let v = version_with_default_pre(rest.trim())?;
        return Ok(VersionRange::exact(v));
    }
    // Bare `X.Y.Z` defaults to caret semantics, matching the common
    // shorthand in compat tables.
    parse_caret(s)
}

/// Hyphen ranges require whitespace on both sides of `-` so that
/// pre-release identifiers containing a hyphen (`1.0.0-alpha`) are never
/// mistaken for a range.
fn split_hyphen(s: &str) -> Option<(&str, &str)> {
    let idx = s.find(" - ")?;
    Some((&s[..idx], &s[idx + 3..]))
}

fn parse_hyphen(a: &str, b: &str) -> Result<VersionRange> {
    let a = a.trim();
    let b = b.trim();
    let lo_parts = parse_parts(a)?;
    let lo = base(
        lo_parts.major,
        lo_parts.minor.unwrap_or(0),
        lo_parts.patch.unwrap_or(0),
    );
    let hi_parts = parse_parts(b)?;
    let hi = match (hi_parts.minor, hi_parts.patch) {
        (None, _) => bump(&base(hi_parts.major, 0, 0), 0),
        (Some(minor), None) => bump(&base(hi_parts.major, minor, 0), 1),
        (Some(minor), Some(patch)) => Version {
            pre: Prerelease::EMPTY,
            ..bump(&base(hi_parts.major, minor, patch), 2)
        },
    };
    Ok(VersionRange {
        intervals: vec![Interval::bounded(lo, hi)],
    })
}

fn parse_caret(s: &str) -> Result<VersionRange> {
    let parts = parse_parts(s)?;
    let lo = Version {
        pre: parts.pre,
        ..base(parts.major, parts.minor.unwrap_or(0), parts.patch.unwrap_or(0))
    };
    let hi = if parts.major > 0 {
        bump(&lo, 0)
    } else if let Some(minor) = parts.minor {
        if minor > 0 {
            bump(&lo, 1)
        } else if parts.patch.is_some() {
            // `^0.0.Z`: the pre-1.0, pre-0.1 exception — singleton.
            bump(&lo, 2)
        } else {
            bump(&lo, 1)
        }
    } else {
        // `^0`
        bump(&lo, 0)
    };
    Ok(VersionRange {
        intervals: vec![Interval::bounded(lo, hi)],
    })
}

fn parse_tilde(s: &str) -> Result<VersionRange> {
    let parts = parse_parts(s)?;
    let lo = Version {
        pre: parts.pre,
        ..base(parts.major, parts.minor.unwrap_or(0), parts.patch.unwrap_or(0))
    };
    let hi = if parts.minor.is_none() {
        // Major-only is equivalent to caret.
        bump(&lo, 0)
    } else if parts.patch.is_some() {
        bump(&lo, 1)
    } else {
        bump(&lo, 1)
    };
    Ok(VersionRange {
        intervals: vec![Interval::bounded(lo, hi)],
    })
}

fn version_with_default_pre(s: &str) -> Result<Version> {
    let parts = parse_parts(s)?;
    Ok(Version {
        pre: parts.pre,
        ..base(parts.major, parts.minor.unwrap_or(0), parts.patch.unwrap_or(0))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn caret_pre_1_0_patch_only_singleton() {
        let r = parse_range("^0.0.3").unwrap();
        assert!(r.contains(&v("0.0.3")));
        assert!(!r.contains(&v("0.0.4")));
        assert!(!r.contains(&v("0.0.2")));
    }

    #[test]
    fn caret_pre_1_0_minor_nonzero_window() {
        let r = parse_range("^0.2.3").unwrap();
        assert!(r.contains(&v("0.2.3")));
        assert!(r.contains(&v("0.2.9")));
        assert!(!r.contains(&v("0.3.0")));
    }

    #[test]
    fn caret_standard() {
        let r = parse_range("^1.2.3").unwrap();
        assert!(r.contains(&v("1.2.3")));
        assert!(r.contains(&v("1.9.0")));
        assert!(!r.contains(&v("2.0.0")));
    }

    #[test]
    fn tilde_restricts_to_patch() {
        let r = parse_range("~1.2.3").unwrap();
        assert!(r.contains(&v("1.2.9")));
        assert!(!r.contains(&v("1.3.0")));
    }

    #[test]
    fn hyphen_range_inclusive_both_ends() {
        let r = parse_range("1.2.3 - 1.4.0").unwrap();
        assert!(r.contains(&v("1.2.3")));
        assert!(r.contains(&v("1.4.0")));
        assert!(!r.contains(&v("1.4.1")));
    }

    #[test]
    fn hyphen_requires_surrounding_whitespace() {
        // Without spaces around `-` this is not parsed as a hyphen range at
        // all: it falls through to the bare caret-ish specifier path, where
        // `1.2.3-1.4.0` is a perfectly valid version (pre-release `1.4.0`),
        // not a `1.2.3 .. 1.4.0` range.
        let r = parse_range("1.2.3-1.4.0").unwrap();
        assert!(r.contains(&v("1.2.3-1.4.0")));
    }

    #[test]
    fn hyphen_missing_trailing_components() {
        let r = parse_range("1.2 - 2").unwrap();
        assert!(r.contains(&v("1.2.0")));
        assert!(r.contains(&v("2.9.9")));
        assert!(!r.contains(&v("3.0.0")));
    }

    #[test]
    fn equality_is_singleton() {
        let r = parse_range("=1.2.3").unwrap();
        assert!(r.contains(&v("1.2.3")));
        assert!(!r.contains(&v("1.2.4")));
    }

    #[test]
    fn union_of_comma_separated_specifiers() {
        let r = parse_range("^1.0.0, ^3.0.0").unwrap();
        assert!(r.contains(&v("1.5.0")));
        assert!(!r.contains(&v("2.0.0")));
        assert!(r.contains(&v("3.0.0")));
    }

    #[test]
    fn intersection_is_commutative_and_empty_when_disjoint() {
        let a = parse_range("^1.0.0").unwrap();
        let b = parse_range("^2.0.0").unwrap();
        assert!(a.intersect(&b).is_empty());
        assert!(b.intersect(&a).is_empty());
    }

    #[test]
    fn intersection_is_idempotent() {
        let a = parse_range("^1.0.0").unwrap();
        assert_eq!(a.intersect(&a), a);
    }
}
