//! The registry store: loads one or more federated registries (packed
//! tarball or unpacked directory), indexes them by `(name, uuid)`, and
//! exposes per-package versions, dependency graphs, and compat ranges.

mod compressed;
mod packed;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use semver::Version;
use uuid::Uuid;

use pkgcore_schemas::{CompatToml, DepsToml, PackageToml, RegistryIndexToml, VersionsToml};

use crate::version::VersionRange;

pub use packed::RegistrySource;

/// Everything the resolver needs to know about one version of one package.
#[derive(Debug, Clone)]
pub struct PackageEntry {
    pub uuid: Uuid,
    pub version: Version,
    pub tree_hash: String,
    pub deps: BTreeMap<String, Uuid>,
    pub compat: BTreeMap<Uuid, VersionRange>,
    pub artifacts_path: Option<PathBuf>,
    pub yanked: bool,
}

/// A single federated registry: packed (tarball, read lazily) or
/// unpacked (a directory tree).
pub struct Registry {
    pub uuid: Uuid,
    pub name: String,
    source: RegistrySource,
    index: BTreeMap<Uuid, String>, // uuid -> package dir (relative)
    name_index: BTreeMap<Uuid, String>, // uuid -> name
    trusted_registries: BTreeMap<Uuid, Vec<Uuid>>, // package uuid -> trust set
}

impl Registry {
    /// Detects packed vs unpacked automatically and builds the in-memory
    /// `(name, uuid)` index without extracting package files.
    pub fn open(path: &Path) -> Result<Registry> {
        let source = if path.is_dir() {
            RegistrySource::Unpacked(path.to_path_buf())
        } else {
            RegistrySource::Packed(packed::PackedArchive::open(path)?)
        };
        let index_toml = source.read_to_string("Registry.toml")?;
        let index: RegistryIndexToml =
            toml::from_str(&index_toml).with_context(|| "parsing Registry.toml")?;

        let mut dir_index = BTreeMap::new();
        let mut name_index = BTreeMap::new();
        for (uuid, pkg) in &index.packages {
            dir_index.insert(*uuid, pkg.path.clone());
            name_index.insert(*uuid, pkg.name.clone());
        }

        Ok(Registry {
            uuid: index.uuid,
            name: index.name,
            source,
            index: dir_index,
            name_index,
            trusted_registries: BTreeMap::new(),
        })
    }

    pub fn name_of(&self, uuid: Uuid) -> Option<&str> {
        self.name_index.get(&uuid).map(String::as_str)
    }

    pub fn trusted_registries_for(&self, uuid: Uuid) -> &[Uuid] {
        self.trusted_registries
            .get(&uuid)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All versions known for `uuid`, sorted descending by default (the
    /// tie-break order §4.1 asks "latest compatible" selection to use).
    pub fn versions(&self, uuid: Uuid) -> Result<Vec<Version>> {
        let dir = self.package_dir(uuid)?;
        let raw = self.source.read_to_string(&format!("{dir}/Versions.toml"))?;
        let versions: VersionsToml = toml::from_str(&raw)?;
        let mut out: Vec<Version> = versions
            .0
            .keys()
            .filter_map(|v| Version::parse(v).ok())
            .collect();
        out.sort_by(|a, b| b.cmp(a));
        Ok(out)
    }

    /// Looks up the full entry for one (uuid, version) pair, resolving
    /// the compressed `Deps.toml`/`Compat.toml` ranges down to the
    /// concrete entry for this specific version.
    pub fn lookup(&mut self, uuid: Uuid, version: &Version) -> Result<PackageEntry> {
        let dir = self.package_dir(uuid)?;
        let package_toml: PackageToml =
            toml::from_str(&self.source.read_to_string(&format!("{dir}/Package.toml"))?)?;
        self.trusted_registries
            .insert(uuid, package_toml.trusted_registries.clone());

        let versions: VersionsToml =
            toml::from_str(&self.source.read_to_string(&format!("{dir}/Versions.toml"))?)?;
        let version_entry = versions
            .0
            .get(&version.to_string())
            .cloned()
            .with_context(|| format!("no recorded tree hash for {uuid}@{version}"))?;
        let tree_hash = version_entry.git_tree_sha1;
        let yanked = version_entry.yanked;

        let deps_path = format!("{dir}/Deps.toml");
        let deps = match self.source.read_to_string(&deps_path) {
            Ok(raw) => {
                let parsed: DepsToml = toml::from_str(&raw)?;
                compressed::resolve_deps(&parsed, version)?
            }
            Err(_) => BTreeMap::new(),
        };

        let compat_path = format!("{dir}/Compat.toml");
        let compat_raw = match self.source.read_to_string(&compat_path) {
            Ok(raw) => {
                let parsed: CompatToml = toml::from_str(&raw)?;
                compressed::resolve_compat(&parsed, version)?
            }
            Err(_) => BTreeMap::new(),
        };
        let mut compat = BTreeMap::new();
        for (dep_name, range_str) in compat_raw {
            if let Some(&dep_uuid) = deps.get(&dep_name) {
                compat.insert(dep_uuid, crate::version::parse_range(&range_str)?);
            }
        }

        Ok(PackageEntry {
            uuid,
            version: version.clone(),
            tree_hash,
            deps,
            compat,
            artifacts_path: None,
            yanked,
        })
    }

    /// Every tree hash this registry has ever recorded for `uuid`, across
    /// all versions — the "known-hash set" `newer_hash` compares a
    /// disagreeing registry's claim against.
    pub fn known_tree_hashes(&self, uuid: Uuid) -> Result<Vec<String>> {
        let dir = self.package_dir(uuid)?;
        let versions: VersionsToml =
            toml::from_str(&self.source.read_to_string(&format!("{dir}/Versions.toml"))?)?;
        Ok(versions.0.values().map(|e| e.git_tree_sha1.clone()).collect())
    }

    fn package_dir(&self, uuid: Uuid) -> Result<String> {
        self.index
            .get(&uuid)
            .cloned()
            .with_context(|| format!("package {uuid} not found in registry `{}`", self.name))
    }

    /// Re-download (packed) or fetch+fast-forward (unpacked/git) the
    /// registry and atomically swap it in. A no-op in offline mode.
    pub fn refresh(&mut self, offline: bool, fetcher: &dyn RegistryFetcher) -> Result<bool> {
        if offline {
            return Ok(false);
        }
        fetcher.refresh(&self.source)
    }
}

/// The external collaborator that actually performs a registry refresh
/// (HTTPS download for packed, git fetch+fast-forward for unpacked) —
/// out of scope for the core per §1, specified here only as the contract
/// `refresh` needs.
pub trait RegistryFetcher {
    fn refresh(&self, source: &RegistrySource) -> Result<bool>;
}

/// Given two registries' claims about the current head hash for the same
/// UUID, decide which is newer: a hash unknown to the other registry's
/// known-hash set is newer; if neither recognizes the other's, tie-break
/// lexicographically (§4.3).
pub fn newer_hash<'a>(
    a_hash: &'a str,
    a_known: &[String],
    b_hash: &'a str,
    b_known: &[String],
) -> &'a str {
    let a_known_to_b = b_known.iter().any(|h| h == a_hash);
    let b_known_to_a = a_known.iter().any(|h| h == b_hash);
    match (a_known_to_b, b_known_to_a) {
        (true, false) => b_hash,
        (false, true) => a_hash,
        _ => std::cmp::max(a_hash, b_hash),
    }
}
