//! The resolver: a SAT-based search (default) with a dependency-free
//! fallback, orchestrated across preserve tiers from strictest to most
//! permissive per §4.7.

pub mod diagnostic;
pub mod maxsum;
pub mod preserve;
pub mod sat;

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use anyhow::Result;
use semver::Version;
use uuid::Uuid;

pub use diagnostic::{ConflictCore, ConstraintEdge, ConstraintOrigin};
pub use preserve::PreserveTier;

use crate::registry::PackageEntry;
use crate::trust::ResolverBackend;
use crate::version::VersionRange;

/// Newtype indices for arena-style resolver state, kept even though the
/// current encoding indexes into `Vec<PackageEntry>` directly, for
/// strategies that want to avoid carrying `Uuid`/`Version` around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageIx(pub u32);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionIx(pub u32);

/// Supplies candidate versions and their dependency/compat data. Bridges
/// the resolver to one or more federated registries without forcing it to
/// own them; see `crate::registry` for the concrete `Registry` this is
/// adapted from in the operations layer.
pub trait PackageSource {
    fn versions(&mut self, uuid: Uuid) -> Result<Vec<Version>>;
    fn entry(&mut self, uuid: Uuid, version: &Version) -> Result<PackageEntry>;
}

/// Everything the caller knows going into a resolve: direct requirements,
/// pins, path-tracked packages' own deps (re-read every resolve), and the
/// previously-resolved baseline preserve tiers measure movement against.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub direct: BTreeMap<String, Uuid>,
    pub compat: BTreeMap<Uuid, VersionRange>,
    pub pinned: BTreeMap<Uuid, Version>,
    pub path_tracked: BTreeMap<Uuid, BTreeMap<String, Uuid>>,
    pub previous: BTreeMap<Uuid, Version>,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub selected: BTreeMap<Uuid, PackageEntry>,
    pub tier_used: PreserveTier,
    /// Names of extensions activated by this resolution (§4.7); populated
    /// by `activated_extensions` once the caller knows the root project's
    /// `extensions`/`weakdeps` tables, not by `resolve` itself.
    pub activated_extensions: BTreeSet<String>,
}

/// Post-resolve extension-activation pass (§4.7): an extension `X` for the
/// root project activates iff every weakdep named in `extensions[X]` is
/// present in the resolved set.
pub fn activated_extensions(
    extensions: &BTreeMap<String, Vec<String>>,
    weakdeps: &BTreeMap<String, Uuid>,
    selected: &BTreeMap<Uuid, PackageEntry>,
) -> BTreeSet<String> {
    extensions
        .iter()
        .filter(|(_, triggers)| {
            !triggers.is_empty()
                && triggers.iter().all(|weakdep_name| {
                    weakdeps
                        .get(weakdep_name)
                        .is_some_and(|uuid| selected.contains_key(uuid))
                })
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// The fully-expanded instance one preserve tier's attempt solves: every
/// reachable package's candidate versions, which packages must have a
/// version selected at all, and any hard range a root imposes.
pub struct Problem {
    pub candidates: BTreeMap<Uuid, Vec<PackageEntry>>,
    pub required: BTreeSet<Uuid>,
    pub root_ranges: BTreeMap<Uuid, (VersionRange, ConstraintOrigin)>,
}

pub enum Outcome {
    Sat(BTreeMap<Uuid, PackageEntry>),
    Unsat(ConflictCore),
    Unknown,
}

trait ResolveStrategy {
    fn resolve(&mut self, problem: &Problem, deadline: Instant) -> Outcome;
}

/// Runs the resolver: tries each preserve tier from strictest (`all`) to
/// most permissive (`none`), returning the first satisfiable result.
pub fn resolve(
    source: &mut dyn PackageSource,
    request: &ResolveRequest,
    backend: ResolverBackend,
    budget: Duration,
) -> crate::error::Result<Resolution> {
    let direct_uuids: BTreeSet<Uuid> = request.direct.values().copied().collect();
    let deadline = Instant::now() + budget;

    let mut last_core = None;
    for tier in PreserveTier::TIERED_ORDER {
        let tier_ranges = preserve::tier_constraints(tier, &request.previous, &direct_uuids);
        let problem = build_problem(source, request, &tier_ranges)
            .map_err(crate::error::Error::Other)?;
        let mut strategy: Box<dyn ResolveStrategy> = match backend {
            ResolverBackend::Sat => Box::new(sat::SatStrategy::new()),
            ResolverBackend::MaxSum => Box::new(maxsum::MaxSumStrategy::new()),
        };
        match strategy.resolve(&problem, deadline) {
            Outcome::Sat(selected) => {
                return Ok(Resolution {
                    selected,
                    tier_used: tier,
                    activated_extensions: BTreeSet::new(),
                });
            }
            Outcome::Unsat(core) => {
                last_core = Some(core);
            }
            Outcome::Unknown => return Err(crate::error::Error::ResolverUnknown),
        }
    }
    Err(crate::error::Error::ResolverUnsat(
        last_core.expect("every tier ran and recorded a core on UNSAT"),
    ))
}

fn build_problem(
    source: &mut dyn PackageSource,
    request: &ResolveRequest,
    tier_ranges: &BTreeMap<Uuid, VersionRange>,
) -> Result<Problem> {
    let mut candidates: BTreeMap<Uuid, Vec<PackageEntry>> = BTreeMap::new();
    let mut required: BTreeSet<Uuid> = BTreeSet::new();
    let mut root_ranges: BTreeMap<Uuid, (VersionRange, ConstraintOrigin)> = BTreeMap::new();

    for uuid in request.direct.values() {
        required.insert(*uuid);
        let range = request
            .compat
            .get(uuid)
            .cloned()
            .unwrap_or_else(VersionRange::unrestricted);
        root_ranges.insert(*uuid, (range, ConstraintOrigin::DirectRequirement));
    }
    for (uuid, version) in &request.pinned {
        required.insert(*uuid);
        let range = VersionRange::exact(version.clone());
        let merged = match root_ranges.remove(uuid) {
            Some((existing, _)) => existing.intersect(&range),
            None => range,
        };
        root_ranges.insert(*uuid, (merged, ConstraintOrigin::Pinned));
    }
    for (uuid, range) in tier_ranges {
        required.insert(*uuid);
        let merged = match root_ranges.remove(uuid) {
            Some((existing, origin)) => (existing.intersect(range), origin),
            None => (range.clone(), ConstraintOrigin::DirectRequirement),
        };
        root_ranges.insert(*uuid, merged);
    }

    let mut queue: Vec<Uuid> = request.direct.values().copied().collect();
    for path_deps in request.path_tracked.values() {
        queue.extend(path_deps.values().copied());
    }
    let mut seen: BTreeSet<Uuid> = BTreeSet::new();
    while let Some(uuid) = queue.pop() {
        if !seen.insert(uuid) {
            continue;
        }
        let mut versions = source.versions(uuid)?;
        versions.sort_by(|a, b| b.cmp(a));
        let mut entries = Vec::new();
        for version in versions {
            let entry = source.entry(uuid, &version)?;
            let previously_selected = request.previous.get(&uuid) == Some(&entry.version);
            if entry.yanked && !previously_selected {
                continue;
            }
            for dep_uuid in entry.deps.values() {
                if !seen.contains(dep_uuid) {
                    queue.push(*dep_uuid);
                }
            }
            entries.push(entry);
        }
        candidates.insert(uuid, entries);
    }

    Ok(Problem {
        candidates,
        required,
        root_ranges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    /// An in-memory `PackageSource` for tests: a fixed universe of
    /// packages keyed by uuid, each with its own candidate versions.
    struct FixtureSource {
        packages: Map<Uuid, Vec<PackageEntry>>,
    }

    impl PackageSource for FixtureSource {
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
                .ok_or_else(|| anyhow::anyhow!("no such entry"))
        }
    }

    fn entry(uuid: Uuid, version: &str, deps: &[(&str, Uuid)], compat: &[(Uuid, &str)]) -> PackageEntry {
        PackageEntry {
            uuid,
            version: Version::parse(version).unwrap(),
            tree_hash: "deadbeef".repeat(8),
            deps: deps.iter().map(|(n, u)| (n.to_string(), *u)).collect(),
            compat: compat
                .iter()
                .map(|(u, r)| (*u, crate::version::parse_range(r).unwrap()))
                .collect(),
            artifacts_path: None,
            yanked: false,
        }
    }

    #[test]
    fn picks_the_highest_version_satisfying_every_constraint() {
        let foo = Uuid::from_u128(1);
        let bar = Uuid::from_u128(2);
        let packages = Map::from([
            (
                foo,
                vec![
                    entry(foo, "2.0.0", &[("Bar", bar)], &[(bar, "^2.0.0")]),
                    entry(foo, "1.0.0", &[("Bar", bar)], &[(bar, "^1.0.0")]),
                ],
            ),
            (
                bar,
                vec![entry(bar, "2.3.0", &[], &[]), entry(bar, "1.5.0", &[], &[])],
            ),
        ]);
        let mut source = FixtureSource { packages };
        let request = ResolveRequest {
            direct: Map::from([("Foo".to_string(), foo)]),
            ..Default::default()
        };
        let resolution = resolve(&mut source, &request, ResolverBackend::Sat, Duration::from_secs(5)).unwrap();
        assert_eq!(
            resolution.selected[&foo].version,
            Version::parse("2.0.0").unwrap()
        );
        assert_eq!(
            resolution.selected[&bar].version,
            Version::parse("2.3.0").unwrap()
        );
    }

    #[test]
    fn falls_through_preserve_tiers_when_all_conflicts_with_an_upgrade() {
        let foo = Uuid::from_u128(1);
        let packages = Map::from([(
            foo,
            vec![entry(foo, "2.0.0", &[], &[]), entry(foo, "1.0.0", &[], &[])],
        )]);
        let mut source = FixtureSource { packages };
        let request = ResolveRequest {
            direct: Map::from([("Foo".to_string(), foo)]),
            previous: Map::from([(foo, Version::parse("1.0.0").unwrap())]),
            ..Default::default()
        };
        // previous pins Foo@1.0.0 under `all`, but there's no conflicting
        // requirement here, so `all` itself should already succeed at 1.0.0.
        let resolution = resolve(&mut source, &request, ResolverBackend::Sat, Duration::from_secs(5)).unwrap();
        assert_eq!(resolution.tier_used, PreserveTier::All);
        assert_eq!(
            resolution.selected[&foo].version,
            Version::parse("1.0.0").unwrap()
        );
    }

    #[test]
    fn unsatisfiable_request_reports_a_conflict_core() {
        let foo = Uuid::from_u128(1);
        let bar = Uuid::from_u128(2);
        let packages = Map::from([
            (foo, vec![entry(foo, "1.0.0", &[], &[])]),
            (bar, vec![entry(bar, "1.0.0", &[], &[])]),
        ]);
        let mut source = FixtureSource { packages };
        let mut compat = Map::new();
        compat.insert(foo, crate::version::parse_range("^2.0.0").unwrap());
        let request = ResolveRequest {
            direct: Map::from([("Foo".to_string(), foo), ("Bar".to_string(), bar)]),
            compat,
            ..Default::default()
        };
        let err = resolve(&mut source, &request, ResolverBackend::Sat, Duration::from_secs(5)).unwrap_err();
        match err {
            crate::error::Error::ResolverUnsat(core) => {
                assert_eq!(core.root, foo);
            }
            other => panic!("expected ResolverUnsat, got {other:?}"),
        }
    }

    #[test]
    fn extension_activates_only_when_every_named_weakdep_is_selected() {
        let bar = Uuid::from_u128(1);
        let baz = Uuid::from_u128(2);
        let weakdeps = Map::from([("Bar".to_string(), bar), ("Baz".to_string(), baz)]);
        let extensions = Map::from([("BarExt".to_string(), vec!["Bar".to_string()])]);
        let mut selected = Map::new();
        assert!(activated_extensions(&extensions, &weakdeps, &selected).is_empty());

        selected.insert(bar, entry(bar, "1.0.0", &[], &[]));
        let activated = activated_extensions(&extensions, &weakdeps, &selected);
        assert!(activated.contains("BarExt"));

        let multi = Map::from([("BarBazExt".to_string(), vec!["Bar".to_string(), "Baz".to_string()])]);
        assert!(activated_extensions(&multi, &weakdeps, &selected).is_empty());
        selected.insert(baz, entry(baz, "1.0.0", &[], &[]));
        assert!(activated_extensions(&multi, &weakdeps, &selected).contains("BarBazExt"));
    }

    #[test]
    fn maxsum_backend_agrees_with_sat_backend() {
        let foo = Uuid::from_u128(1);
        let bar = Uuid::from_u128(2);
        let packages = Map::from([
            (
                foo,
                vec![
                    entry(foo, "2.0.0", &[("Bar", bar)], &[(bar, "^2.0.0")]),
                    entry(foo, "1.0.0", &[("Bar", bar)], &[(bar, "^1.0.0")]),
                ],
            ),
            (
                bar,
                vec![entry(bar, "2.3.0", &[], &[]), entry(bar, "1.5.0", &[], &[])],
            ),
        ]);
        let mut source = FixtureSource {
            packages: packages.clone(),
        };
        let request = ResolveRequest {
            direct: Map::from([("Foo".to_string(), foo)]),
            ..Default::default()
        };
        let resolution =
            resolve(&mut source, &request, ResolverBackend::MaxSum, Duration::from_secs(5)).unwrap();
        assert_eq!(
            resolution.selected[&foo].version,
            Version::parse("2.0.0").unwrap()
        );
    }
}
