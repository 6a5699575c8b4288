//! The host's representation as a set of platform properties, and the
//! most-specific-match selection rule used to pick an artifact entry.
//!
//! Mirrors the way a platform-predicate matcher for a manifest's
//! `target.'cfg(...)'` tables works: a fixed set of well-known keys
//! (`os`, `arch`, `libc`) plus arbitrary extensible keys, each entry
//! matching iff every predicate key it declares agrees with the host.

use std::collections::BTreeMap;

/// The running host, expressed as key/value platform properties.
/// Always carries `os` and `arch`; `libc` and any vendor-specific keys
/// (e.g. `cuda`) are optional and may be added by an augmentation hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatform {
    properties: BTreeMap<String, String>,
}

impl HostPlatform {
    /// The platform pkgcore is actually running on, per `std::env::consts`.
    pub fn current() -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("os".to_string(), std::env::consts::OS.to_string());
        properties.insert("arch".to_string(), std::env::consts::ARCH.to_string());
        if cfg!(target_env = "gnu") {
            properties.insert("libc".to_string(), "glibc".to_string());
        } else if cfg!(target_env = "musl") {
            properties.insert("libc".to_string(), "musl".to_string());
        }
        HostPlatform { properties }
    }

    pub fn from_properties(properties: BTreeMap<String, String>) -> Self {
        HostPlatform { properties }
    }

    /// Add or overwrite a dynamic property (e.g. a detected CUDA driver
    /// version), as an augmentation hook would before artifact selection.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// How specifically a predicate map matches the host: the count of
/// predicate keys that agreed, or `None` if any of them disagreed.
pub fn match_specificity(
    predicates: &BTreeMap<String, String>,
    host: &HostPlatform,
) -> Option<usize> {
    let mut matched = 0;
    for (key, want) in predicates {
        match host.get(key) {
            Some(have) if have == want => matched += 1,
            _ => return None,
        }
    }
    Some(matched)
}

/// Pick the most specific matching candidate among `candidates`, each
/// paired with its predicate map (an empty map matches everything with
/// specificity 0, i.e. a platform-independent entry).
///
/// Returns `Err` when two or more candidates tie for the highest
/// specificity, since the binding is ambiguous.
pub fn select_most_specific<'a, T>(
    candidates: impl IntoIterator<Item = (&'a BTreeMap<String, String>, T)>,
    host: &HostPlatform,
) -> Result<Option<T>, AmbiguousMatch> {
    let mut best: Option<(usize, T)> = None;
    let mut tie = false;
    for (predicates, value) in candidates {
        let Some(score) = match_specificity(predicates, host) else {
            continue;
        };
        match &best {
            Some((best_score, _)) if score > *best_score => {
                best = Some((score, value));
                tie = false;
            }
            Some((best_score, _)) if score == *best_score => {
                tie = true;
            }
            None => best = Some((score, value)),
            _ => {}
        }
    }
    if tie {
        return Err(AmbiguousMatch);
    }
    Ok(best.map(|(_, v)| v))
}

#[derive(Debug)]
pub struct AmbiguousMatch;

impl std::fmt::Display for AmbiguousMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "multiple artifact bindings match the host platform equally specifically")
    }
}

impl std::error::Error for AmbiguousMatch {}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> HostPlatform {
        let mut p = BTreeMap::new();
        p.insert("os".to_string(), "linux".to_string());
        p.insert("arch".to_string(), "x86_64".to_string());
        HostPlatform::from_properties(p)
    }

    #[test]
    fn most_specific_wins_over_platform_independent() {
        let generic = BTreeMap::new();
        let mut specific = BTreeMap::new();
        specific.insert("os".to_string(), "linux".to_string());
        let result = select_most_specific(
            vec![(&generic, "generic"), (&specific, "linux-specific")],
            &host(),
        )
        .unwrap();
        assert_eq!(result, Some("linux-specific"));
    }

    #[test]
    fn non_matching_os_is_excluded() {
        let mut macos = BTreeMap::new();
        macos.insert("os".to_string(), "macos".to_string());
        let result = select_most_specific(vec![(&macos, "mac")], &host()).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn tie_is_ambiguous() {
        let mut a = BTreeMap::new();
        a.insert("os".to_string(), "linux".to_string());
        let mut b = BTreeMap::new();
        b.insert("arch".to_string(), "x86_64".to_string());
        let result = select_most_specific(vec![(&a, "a"), (&b, "b")], &host());
        assert!(result.is_err());
    }
}
