//! Garbage collection: age-gated orphan collection over the writable
//! depot, driven by the set of manifests known to still exist on disk.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Depot;
use crate::manifest::read_manifest;

/// Every artifact tree hash an installed package's `Artifacts.toml` (if
/// any) names, across all platform-tagged entries — gc keeps anything
/// any binding could reference, not just the host's current selection.
fn package_artifact_hashes(pkg_path: &Path) -> Vec<String> {
    let artifacts_path = pkg_path.join("Artifacts.toml");
    let Ok(bindings) = crate::artifact::read_artifacts(&artifacts_path) else {
        return Vec::new();
    };
    bindings
        .0
        .values()
        .flat_map(|value| value.entries().iter().map(|e| e.git_tree_sha1.clone()))
        .collect()
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct OrphanLog {
    #[serde(default)]
    orphans: BTreeMap<String, u64>, // path string -> first-seen unix time
}

#[derive(Debug, Default)]
pub struct GcReport {
    pub removed: Vec<PathBuf>,
    pub newly_orphaned: Vec<PathBuf>,
    pub still_orphaned: Vec<PathBuf>,
    pub pruned_manifests: Vec<PathBuf>,
}

pub fn run(depot: &Depot, collect_delay: Duration, now_unix: u64, dry_run: bool) -> Result<GcReport> {
    let mut report = GcReport::default();
    let usage_log = depot.writable_root().join("logs").join("manifest_usage.toml");
    let known_manifests = read_usage_log(&usage_log)?;

    let mut live: Vec<PathBuf> = Vec::new();
    for path in &known_manifests {
        if path.is_file() {
            live.push(path.clone());
        } else {
            report.pruned_manifests.push(path.clone());
        }
    }
    if !dry_run && !report.pruned_manifests.is_empty() {
        rewrite_usage_log(&usage_log, &live)?;
    }

    let mut referenced: HashSet<PathBuf> = HashSet::new();
    for manifest_path in &live {
        let manifest = match read_manifest(manifest_path) {
            Ok(m) => m,
            Err(_) => continue, // unreadable manifest: treat conservatively, don't collect under it
        };
        for (name, entries) in &manifest.toml.deps {
            for entry in entries {
                let Some(hash) = &entry.git_tree_sha1 else { continue };
                let Ok(Some(pkg_path)) = depot.resolve_path(super::EntryKind::Package, Some(name), hash) else {
                    continue;
                };
                for artifact_hash in package_artifact_hashes(&pkg_path) {
                    if let Ok(Some(artifact_path)) =
                        depot.resolve_path(super::EntryKind::Artifact, None, &artifact_hash)
                    {
                        referenced.insert(artifact_path);
                    }
                }
                referenced.insert(pkg_path);
            }
        }
    }

    let orphan_log_path = depot.writable_root().join("logs").join("orphans.toml");
    let mut orphan_log = read_orphan_log(&orphan_log_path)?;

    let mut installed = Vec::new();
    let packages_dir = depot.writable_root().join("packages");
    if packages_dir.is_dir() {
        for name_entry in fs::read_dir(&packages_dir)?.flatten() {
            if !name_entry.path().is_dir() {
                continue;
            }
            for hash_entry in fs::read_dir(name_entry.path())?.flatten() {
                if hash_entry.path().is_dir() {
                    installed.push(hash_entry.path());
                }
            }
        }
    }
    let artifacts_dir = depot.writable_root().join("artifacts");
    if artifacts_dir.is_dir() {
        for hash_entry in fs::read_dir(&artifacts_dir)?.flatten() {
            if hash_entry.path().is_dir() {
                installed.push(hash_entry.path());
            }
        }
    }

    let mut still_present_keys = HashSet::new();
    for path in &installed {
        let key = path.display().to_string();
        if referenced.contains(path) {
            // Reachable again: cancel any orphan record (reprieve).
            orphan_log.orphans.remove(&key);
            continue;
        }
        still_present_keys.insert(key.clone());
        let first_seen = *orphan_log.orphans.entry(key.clone()).or_insert(now_unix);
        let age = now_unix.saturating_sub(first_seen);
        if age >= collect_delay.as_secs() {
            if !dry_run {
                pkgcore_util::paths::remove_dir_all_if_exists(path)?;
            }
            report.removed.push(path.clone());
            orphan_log.orphans.remove(&key);
        } else if first_seen == now_unix {
            report.newly_orphaned.push(path.clone());
        } else {
            report.still_orphaned.push(path.clone());
        }
    }
    orphan_log.orphans.retain(|k, _| still_present_keys.contains(k));

    if !dry_run {
        write_orphan_log(&orphan_log_path, &orphan_log)?;
    }
    Ok(report)
}

fn read_usage_log(path: &Path) -> Result<Vec<PathBuf>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return Ok(Vec::new()),
    };
    #[derive(Deserialize)]
    struct Entry {
        path: String,
    }
    #[derive(Deserialize)]
    struct Log {
        #[serde(default)]
        manifest: Vec<Entry>,
    }
    let log: Log = toml::from_str(&raw)?;
    Ok(log.manifest.into_iter().map(|e| PathBuf::from(e.path)).collect())
}

fn rewrite_usage_log(path: &Path, live: &[PathBuf]) -> Result<()> {
    let mut out = String::new();
    for p in live {
        out.push_str("[[manifest]]\n");
        out.push_str(&format!("path = {:?}\n", p.display().to_string()));
    }
    pkgcore_util::paths::write_atomic(path, &out)
}

fn read_orphan_log(path: &Path) -> Result<OrphanLog> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(toml::from_str(&raw)?),
        Err(_) => Ok(OrphanLog::default()),
    }
}

fn write_orphan_log(path: &Path, log: &OrphanLog) -> Result<()> {
    let rendered = toml::to_string_pretty(log)?;
    pkgcore_util::paths::write_atomic(path, &rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreferenced_package_is_collected_after_delay_zero() {
        let dir = tempfile::tempdir().unwrap();
        let depot = Depot::new(vec![dir.path().to_path_buf()]);
        let pkg_dir = dir.path().join("packages/H/aaaaaaaa");
        fs::create_dir_all(&pkg_dir).unwrap();

        let report = run(&depot, Duration::from_secs(0), 1_000, false).unwrap();
        assert_eq!(report.removed, vec![pkg_dir.clone()]);
        assert!(!pkg_dir.exists());

        // Second run is a no-op.
        let report2 = run(&depot, Duration::from_secs(0), 2_000, false).unwrap();
        assert!(report2.removed.is_empty());
    }

    #[test]
    fn referenced_packages_artifact_survives_while_an_unbound_one_is_collected() {
        use pkgcore_schemas::{ArtifactBindingValue, ArtifactEntry, ArtifactsToml, ManifestEntry, ManifestToml};

        let dir = tempfile::tempdir().unwrap();
        let depot = Depot::new(vec![dir.path().to_path_buf()]);

        let used_hash = "a".repeat(64);
        let orphan_hash = "b".repeat(64);
        fs::create_dir_all(dir.path().join("artifacts").join(&used_hash)).unwrap();
        fs::create_dir_all(dir.path().join("artifacts").join(&orphan_hash)).unwrap();

        let pkg_dir = dir.path().join("packages/Example/aaaaaaaa");
        fs::create_dir_all(&pkg_dir).unwrap();
        let mut bindings = ArtifactsToml::default();
        bindings.0.insert(
            "MyLib".to_string(),
            ArtifactBindingValue::Single(ArtifactEntry {
                git_tree_sha1: used_hash.clone(),
                download: vec![],
                lazy: false,
                os: None,
                arch: None,
                libc: None,
                extra: BTreeMap::new(),
            }),
        );
        crate::artifact::write_artifacts(&pkg_dir.join("Artifacts.toml"), &bindings).unwrap();

        let manifest_path = dir.path().join("Manifest.toml");
        let mut manifest = ManifestToml::new("1.10.0".into(), "irrelevant".into());
        manifest.deps.insert(
            "Example".to_string(),
            vec![ManifestEntry {
                uuid: uuid::Uuid::nil(),
                version: None,
                git_tree_sha1: Some("aaaaaaaa".to_string()),
                deps: vec![],
                repo_url: None,
                repo_rev: None,
                path: None,
                pinned: false,
            }],
        );
        crate::manifest::write_manifest(&manifest_path, &manifest).unwrap();
        depot.record_usage(&manifest_path, 500).unwrap();

        let report = run(&depot, Duration::from_secs(0), 1_000, false).unwrap();
        assert_eq!(report.removed, vec![dir.path().join("artifacts").join(&orphan_hash)]);
        assert!(dir.path().join("artifacts").join(&used_hash).exists());
        assert!(pkg_dir.exists());
    }

    #[test]
    fn orphan_survives_until_collect_delay_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let depot = Depot::new(vec![dir.path().to_path_buf()]);
        let pkg_dir = dir.path().join("packages/H/aaaaaaaa");
        fs::create_dir_all(&pkg_dir).unwrap();

        let report = run(&depot, Duration::from_secs(3600), 1_000, false).unwrap();
        assert!(report.removed.is_empty());
        assert!(pkg_dir.exists());

        let report2 = run(&depot, Duration::from_secs(3600), 1_000 + 3601, false).unwrap();
        assert_eq!(report2.removed, vec![pkg_dir]);
    }
}
