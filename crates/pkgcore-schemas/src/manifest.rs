//! The machine-managed lock file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use semver::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CURRENT_MANIFEST_FORMAT: &str = "2.0";

/// Top-level schema of the machine-managed manifest file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ManifestToml {
    pub julia_version: Option<String>,
    pub manifest_format: String,
    pub project_hash: Option<String>,
    /// `[[deps.NAME]]` array-of-tables; a name may repeat with distinct
    /// UUIDs when two registries disagree on which package a name means.
    #[serde(rename = "deps", default)]
    pub deps: BTreeMap<String, Vec<ManifestEntry>>,
}

impl ManifestToml {
    pub fn new(host_version: String, project_hash: String) -> Self {
        ManifestToml {
            julia_version: Some(host_version),
            manifest_format: CURRENT_MANIFEST_FORMAT.to_string(),
            project_hash: Some(project_hash),
            deps: BTreeMap::new(),
        }
    }

    /// Restructures a pre-2.0 manifest (a flat `uuid -> entry` table) into
    /// the current `name -> [entry]` shape.
    pub fn upgrade_from_v1(v1: ManifestTomlV1) -> Self {
        let mut deps: BTreeMap<String, Vec<ManifestEntry>> = BTreeMap::new();
        for (name, entry) in v1.deps {
            deps.entry(name).or_default().push(entry);
        }
        ManifestToml {
            julia_version: v1.julia_version,
            manifest_format: CURRENT_MANIFEST_FORMAT.to_string(),
            project_hash: v1.project_hash,
            deps,
        }
    }
}

/// The legacy v1.0 shape: one entry per name, no array-of-tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestTomlV1 {
    pub julia_version: Option<String>,
    pub project_hash: Option<String>,
    #[serde(default)]
    pub deps: BTreeMap<String, ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub uuid: Uuid,
    pub version: Option<Version>,
    #[serde(rename = "git-tree-sha1")]
    pub git_tree_sha1: Option<String>,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(rename = "repo-url")]
    pub repo_url: Option<String>,
    #[serde(rename = "repo-rev")]
    pub repo_rev: Option<String>,
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pinned: bool,
}
