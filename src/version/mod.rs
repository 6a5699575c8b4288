//! Versions and version ranges.
//!
//! `Version` is re-exported straight from `semver`, whose total order
//! already implements the precedence rules this spec wants. `VersionRange`
//! is a hand-rolled union of half-open intervals: `semver::VersionReq`
//! doesn't implement the pre-1.0 exception (`^0.0.3` must admit only
//! `0.0.3`, not the usual caret window), so reusing it here would silently
//! violate §3's testable property 7. See DESIGN.md.

mod range;

pub use range::{parse_range, Interval, VersionRange};
pub use semver::Version;

use anyhow::{bail, Result};

/// Strict version parsing: rejects leading zeros, extra components, and
/// malformed pre-release identifiers the way `semver::Version::parse`
/// already does; kept as a thin wrapper so call sites don't need to know
/// which crate backs `Version`.
pub fn parse(s: &str) -> Result<Version> {
    match Version::parse(s) {
        Ok(v) => Ok(v),
        Err(e) => bail!("invalid version `{s}`: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_leading_zeros() {
        assert!(parse("1.02.0").is_err());
    }

    #[test]
    fn orders_pre_release_below_release() {
        let pre = parse("1.0.0-alpha").unwrap();
        let rel = parse("1.0.0").unwrap();
        assert!(pre < rel);
    }
}
