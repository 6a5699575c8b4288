//! Per-package registry metadata files: `Package.toml`, `Versions.toml`,
//! `Deps.toml`, `Compat.toml`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The registry-level index (`Registry.toml`): lets the store build a
/// `(name, uuid) -> path` index without extracting every package's files,
/// whether the registry is packed or unpacked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryIndexToml {
    pub name: String,
    pub uuid: Uuid,
    #[serde(default)]
    pub packages: BTreeMap<Uuid, RegistryIndexPackage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryIndexPackage {
    pub name: String,
    /// Directory, relative to the registry root, holding this package's
    /// `Package.toml`/`Versions.toml`/`Deps.toml`/`Compat.toml`.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageToml {
    pub name: String,
    pub uuid: Uuid,
    pub repo: Option<String>,
    pub subdir: Option<String>,
    #[serde(default)]
    pub trusted_registries: Vec<Uuid>,
}

/// `{version-string: {git-tree-sha1, yanked}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VersionsToml(pub BTreeMap<String, VersionsEntry>);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionsEntry {
    #[serde(rename = "git-tree-sha1")]
    pub git_tree_sha1: String,
    #[serde(default)]
    pub yanked: bool,
}

/// Compressed `{version-range-string: {dep-name: dep-uuid}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DepsToml(pub BTreeMap<String, BTreeMap<String, Uuid>>);

/// Compressed `{version-range-string: {dep-name: compat-range-string}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CompatToml(pub BTreeMap<String, BTreeMap<String, String>>);
