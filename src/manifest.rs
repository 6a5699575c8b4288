//! The machine-managed lock file: reading (with v1→v2 upgrade and
//! versioned-filename selection), writing, and the staleness predicate.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use pkgcore_schemas::{ManifestToml, ManifestTomlV1};

use crate::project::project_hash;
use pkgcore_schemas::ProjectToml;

#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    pub toml: ManifestToml,
}

/// Picks `Manifest-vMAJOR.MINOR.toml` over `Manifest.toml` when the
/// versioned file exists and its version matches `host_version`; falls
/// back to the unversioned name otherwise.
pub fn manifest_path_for(dir: &Path, host_version: &str) -> PathBuf {
    if let Some((major, minor)) = host_version.split('.').collect::<Vec<_>>().get(0..2).and_then(|p| {
        Some((p[0].to_string(), p[1].to_string()))
    }) {
        let versioned = dir.join(format!("Manifest-v{major}.{minor}.toml"));
        if versioned.is_file() {
            return versioned;
        }
    }
    dir.join("Manifest.toml")
}

pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading manifest `{}`", path.display()))?;
    let toml = match toml::from_str::<ManifestToml>(&raw) {
        Ok(toml) if !toml.manifest_format.is_empty() => toml,
        _ => {
            let v1: ManifestTomlV1 = toml::from_str(&raw)
                .with_context(|| format!("parsing manifest `{}`", path.display()))?;
            ManifestToml::upgrade_from_v1(v1)
        }
    };
    Ok(Manifest {
        path: path.to_path_buf(),
        toml,
    })
}

pub fn write_manifest(path: &Path, manifest: &ManifestToml) -> Result<()> {
    let rendered = toml::to_string_pretty(manifest).context("serializing manifest")?;
    pkgcore_util::paths::write_atomic(path, &rendered)
}

/// True iff the manifest's recorded `project_hash` still matches the
/// current project file's hash — the staleness predicate used by
/// `resolve()`/`instantiate()` to decide whether to re-resolve.
pub fn is_current(manifest: &ManifestToml, project: &ProjectToml) -> Result<bool> {
    let current = project_hash(project)?;
    Ok(manifest.project_hash.as_deref() == Some(current.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_current_detects_a_changed_project() {
        let project: ProjectToml = toml::from_str(
            r#"
                name = "Example"
                uuid = "7876af07-990d-54b4-ab0e-23690620f79a"
            "#,
        )
        .unwrap();
        let hash = project_hash(&project).unwrap();
        let manifest = ManifestToml::new("1.10.0".into(), hash);
        assert!(is_current(&manifest, &project).unwrap());

        let mut changed = project.clone();
        changed.version = Some(semver::Version::new(1, 0, 0));
        assert!(!is_current(&manifest, &changed).unwrap());
    }

    #[test]
    fn versioned_filename_preferred_when_present() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Manifest.toml"), "manifest_format = \"2.0\"\n").unwrap();
        fs::write(
            dir.path().join("Manifest-v1.10.toml"),
            "manifest_format = \"2.0\"\n",
        )
        .unwrap();
        let path = manifest_path_for(dir.path(), "1.10.0");
        assert_eq!(path.file_name().unwrap(), "Manifest-v1.10.toml");
    }

    #[test]
    fn falls_back_to_unversioned_when_no_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Manifest.toml"), "manifest_format = \"2.0\"\n").unwrap();
        let path = manifest_path_for(dir.path(), "1.11.0");
        assert_eq!(path.file_name().unwrap(), "Manifest.toml");
    }
}
