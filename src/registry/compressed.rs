//! Deps.toml/Compat.toml are compressed by version range: rather than
//! repeating `{dep-name: dep-uuid}` for every version, entries are keyed
//! by the range of versions they apply to. Looking up one version means
//! merging every entry whose range contains it.

use std::collections::BTreeMap;

use anyhow::Result;
use semver::Version;
use uuid::Uuid;

use pkgcore_schemas::{CompatToml, DepsToml};

pub fn resolve_deps(deps: &DepsToml, version: &Version) -> Result<BTreeMap<String, Uuid>> {
    let mut out = BTreeMap::new();
    for (range_str, entries) in &deps.0 {
        let range = crate::version::parse_range(range_str)?;
        if range.contains(version) {
            out.extend(entries.iter().map(|(k, v)| (k.clone(), *v)));
        }
    }
    Ok(out)
}

pub fn resolve_compat(compat: &CompatToml, version: &Version) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for (range_str, entries) in &compat.0 {
        let range = crate::version::parse_range(range_str)?;
        if range.contains(version) {
            out.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_entries_whose_range_contains_the_version() {
        let mut map = BTreeMap::new();
        map.insert(
            "0.1.0 - 0.2.0".to_string(),
            BTreeMap::from([("Dep".to_string(), Uuid::nil())]),
        );
        let deps = DepsToml(map);
        let resolved = resolve_deps(&deps, &Version::parse("0.1.5").unwrap()).unwrap();
        assert_eq!(resolved.get("Dep"), Some(&Uuid::nil()));
        let resolved_outside = resolve_deps(&deps, &Version::parse("0.3.0").unwrap()).unwrap();
        assert!(resolved_outside.is_empty());
    }
}
