//! Test-only helpers for building small in-memory registries and driving
//! the resolver against them, the way `rust-lang-cargo`'s own
//! `resolver-tests` crate drives cargo's resolver without a real registry.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use semver::Version;
use uuid::Uuid;

use pkgcore::registry::PackageEntry;
use pkgcore::resolver::{resolve, PackageSource, Resolution, ResolveRequest};
use pkgcore::trust::ResolverBackend;

/// A package, named for readability in test fixtures, whose uuid is
/// deterministic so the same name always maps to the same uuid within a
/// test run (tests never call `Uuid::new_v4`: fixtures are easier to
/// eyeball with stable ids, and determinism assertions depend on it).
/// Derived via `sha1` rather than pulling in uuid's `v5` feature for
/// test-only code.
pub fn pkg_uuid(name: &str) -> Uuid {
    use sha1::{Digest, Sha1};
    let digest = Sha1::digest(name.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// An in-memory universe of packages, keyed by uuid, used as a
/// `PackageSource` for resolver tests without touching a real registry.
#[derive(Default, Clone)]
pub struct FixtureRegistry {
    packages: BTreeMap<Uuid, Vec<PackageEntry>>,
}

impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one version of `name` with the given deps (by name) and
    /// compat ranges (dep name, range string) pairs.
    pub fn version(
        &mut self,
        name: &str,
        version: &str,
        deps: &[&str],
        compat: &[(&str, &str)],
    ) -> &mut Self {
        let uuid = pkg_uuid(name);
        let entry = PackageEntry {
            uuid,
            version: Version::parse(version).expect("valid fixture version"),
            tree_hash: "ab".repeat(20),
            deps: deps
                .iter()
                .map(|dep_name| (dep_name.to_string(), pkg_uuid(dep_name)))
                .collect(),
            compat: compat
                .iter()
                .map(|(dep_name, range)| {
                    (
                        pkg_uuid(dep_name),
                        pkgcore::version::parse_range(range).expect("valid fixture range"),
                    )
                })
                .collect(),
            artifacts_path: None,
            yanked: false,
        };
        self.packages.entry(uuid).or_default().push(entry);
        self
    }

    pub fn yank(&mut self, name: &str, version: &str) -> &mut Self {
        let uuid = pkg_uuid(name);
        if let Some(entries) = self.packages.get_mut(&uuid) {
            let v = Version::parse(version).expect("valid fixture version");
            if let Some(e) = entries.iter_mut().find(|e| e.version == v) {
                e.yanked = true;
            }
        }
        self
    }
}

impl PackageSource for FixtureRegistry {
    fn versions(&mut self, uuid: Uuid) -> Result<Vec<Version>> {
        Ok(self
            .packages
            .get(&uuid)
            .map(|entries| entries.iter().map(|e| e.version.clone()).collect())
            .unwrap_or_default())
    }

    fn entry(&mut self, uuid: Uuid, version: &Version) -> Result<PackageEntry> {
        self.packages
            .get(&uuid)
            .and_then(|entries| entries.iter().find(|e| &e.version == version))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("fixture has no entry for {uuid}@{version}"))
    }
}

/// Resolves `request` against `registry` with a generous deadline, for
/// tests that don't care about timeout behavior.
pub fn resolve_fixture(
    registry: &mut FixtureRegistry,
    request: &ResolveRequest,
    backend: ResolverBackend,
) -> pkgcore::Result<Resolution> {
    resolve(registry, request, backend, Duration::from_secs(5))
}

/// Builds a `ResolveRequest` naming each of `names` as a direct dependency.
pub fn direct_request(names: &[&str]) -> ResolveRequest {
    ResolveRequest {
        direct: names.iter().map(|n| (n.to_string(), pkg_uuid(n))).collect(),
        ..Default::default()
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// A small deterministic universe: `Root` depends on `Mid`, which
    /// depends on `Leaf`; each has a handful of versions so the resolver
    /// has real choices to make. Parameterized by version counts so
    /// proptest can vary the search space across runs.
    fn universe(root_versions: u32, mid_versions: u32, leaf_versions: u32) -> FixtureRegistry {
        let mut reg = FixtureRegistry::new();
        for i in 0..leaf_versions.max(1) {
            reg.version("Leaf", &format!("1.{i}.0"), &[], &[]);
        }
        for i in 0..mid_versions.max(1) {
            reg.version("Mid", &format!("1.{i}.0"), &["Leaf"], &[("Leaf", "^1.0.0")]);
        }
        for i in 0..root_versions.max(1) {
            reg.version("Root", &format!("1.{i}.0"), &["Mid"], &[("Mid", "^1.0.0")]);
        }
        reg
    }

    fn selection_fingerprint(resolution: &Resolution) -> Vec<(Uuid, Version)> {
        resolution
            .selected
            .iter()
            .map(|(u, e)| (*u, e.version.clone()))
            .collect()
    }

    proptest! {
        /// Testable property 6 (determinism of selection): the same
        /// inputs always yield the same resolved set, regardless of how
        /// many times the resolver is invoked.
        #[test]
        fn resolution_is_deterministic(root_n in 1u32..5, mid_n in 1u32..5, leaf_n in 1u32..5) {
            let mut reg = universe(root_n, mid_n, leaf_n);
            let request = direct_request(&["Root"]);
            let first = resolve_fixture(&mut reg, &request, ResolverBackend::Sat).unwrap();
            let second = resolve_fixture(&mut reg, &request, ResolverBackend::Sat).unwrap();
            prop_assert_eq!(selection_fingerprint(&first), selection_fingerprint(&second));
        }

        /// Testable property 1 (idempotence of resolve): re-resolving
        /// with the prior resolution fed back as `previous` under the
        /// default tiered strategy reproduces the same assignment.
        #[test]
        fn resolve_is_idempotent_once_settled(root_n in 1u32..5, mid_n in 1u32..5, leaf_n in 1u32..5) {
            let mut reg = universe(root_n, mid_n, leaf_n);
            let request = direct_request(&["Root"]);
            let first = resolve_fixture(&mut reg, &request, ResolverBackend::Sat).unwrap();

            let mut second_request = request.clone();
            second_request.previous = first
                .selected
                .iter()
                .map(|(uuid, entry)| (*uuid, entry.version.clone()))
                .collect();
            let second = resolve_fixture(&mut reg, &second_request, ResolverBackend::Sat).unwrap();

            prop_assert_eq!(selection_fingerprint(&first), selection_fingerprint(&second));
        }

        /// Testable property 2 (manifest faithfulness): every selected
        /// version satisfies every compat range any other selected
        /// package imposes on it.
        #[test]
        fn selection_satisfies_every_imposed_compat_range(root_n in 1u32..5, mid_n in 1u32..5, leaf_n in 1u32..5) {
            let mut reg = universe(root_n, mid_n, leaf_n);
            let request = direct_request(&["Root"]);
            let resolution = resolve_fixture(&mut reg, &request, ResolverBackend::Sat).unwrap();

            for entry in resolution.selected.values() {
                for (dep_uuid, range) in &entry.compat {
                    if let Some(dep_entry) = resolution.selected.get(dep_uuid) {
                        prop_assert!(
                            range.contains(&dep_entry.version),
                            "selected {:?}@{} violates compat {:?} imposed by {:?}@{}",
                            dep_uuid, dep_entry.version, range, entry.uuid, entry.version,
                        );
                    }
                }
            }
        }

        /// SAT and MaxSum backends must agree on the winning version for
        /// the same instance: both claim to pick the highest satisfying
        /// version, so they're interchangeable by contract.
        #[test]
        fn sat_and_maxsum_backends_agree(root_n in 1u32..5, mid_n in 1u32..5, leaf_n in 1u32..5) {
            let mut sat_reg = universe(root_n, mid_n, leaf_n);
            let mut maxsum_reg = universe(root_n, mid_n, leaf_n);
            let request = direct_request(&["Root"]);
            let sat = resolve_fixture(&mut sat_reg, &request, ResolverBackend::Sat).unwrap();
            let maxsum = resolve_fixture(&mut maxsum_reg, &request, ResolverBackend::MaxSum).unwrap();
            prop_assert_eq!(selection_fingerprint(&sat), selection_fingerprint(&maxsum));
        }
    }

    #[test]
    fn yanked_version_is_excluded_from_fresh_selection() {
        let mut reg = FixtureRegistry::new();
        reg.version("Leaf", "1.0.0", &[], &[]);
        reg.version("Leaf", "1.1.0", &[], &[]);
        reg.yank("Leaf", "1.1.0");
        let request = direct_request(&["Leaf"]);
        let resolution = resolve_fixture(&mut reg, &request, ResolverBackend::Sat).unwrap();
        assert_eq!(
            resolution.selected[&pkg_uuid("Leaf")].version,
            Version::parse("1.0.0").unwrap()
        );
    }

    #[test]
    fn yanked_version_already_in_manifest_remains_selectable() {
        let mut reg = FixtureRegistry::new();
        reg.version("Leaf", "1.0.0", &[], &[]);
        reg.version("Leaf", "1.1.0", &[], &[]);
        reg.yank("Leaf", "1.1.0");
        let mut request = direct_request(&["Leaf"]);
        request
            .previous
            .insert(pkg_uuid("Leaf"), Version::parse("1.1.0").unwrap());
        let resolution = resolve_fixture(&mut reg, &request, ResolverBackend::Sat).unwrap();
        assert_eq!(
            resolution.selected[&pkg_uuid("Leaf")].version,
            Version::parse("1.1.0").unwrap()
        );
    }
}
