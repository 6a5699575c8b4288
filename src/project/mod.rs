//! Project/Manifest IO: reading and writing the human-edited project file
//! and the machine-managed manifest, plus workspace aggregation.

mod workspace;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use pkgcore_schemas::ProjectToml;

pub use workspace::merged_requirements;

/// A loaded, validated project file.
#[derive(Debug, Clone)]
pub struct Project {
    pub path: PathBuf,
    pub toml: ProjectToml,
}

pub fn read_project(path: &Path) -> Result<Project> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading project file `{}`", path.display()))?;
    let toml: ProjectToml = toml::from_str(&raw)
        .with_context(|| format!("parsing project file `{}`", path.display()))?;
    validate(&toml)?;
    Ok(Project {
        path: path.to_path_buf(),
        toml,
    })
}

fn validate(toml: &ProjectToml) -> Result<()> {
    let mut seen: std::collections::HashMap<&str, Uuid> = std::collections::HashMap::new();
    for (name, uuid) in toml
        .deps
        .iter()
        .chain(toml.weakdeps.iter())
        .chain(toml.extras.iter())
    {
        if let Some(prev) = seen.insert(name.as_str(), *uuid) {
            if prev != *uuid {
                bail!(
                    "`{name}` refers to different UUIDs in deps/weakdeps/extras ({prev} vs {uuid})"
                );
            }
        }
    }
    Ok(())
}

pub fn write_project(path: &Path, project: &ProjectToml) -> Result<()> {
    let rendered =
        toml::to_string_pretty(project).with_context(|| "serializing project file")?;
    pkgcore_util::paths::write_atomic(path, &rendered)
}

/// A deterministic hash of the project file's logical content, used as
/// the manifest's staleness detector (`project_hash`).
pub fn project_hash(project: &ProjectToml) -> Result<String> {
    let canonical = serde_json::to_vec(project)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_name_with_different_uuid() {
        let toml_src = r#"
            name = "Example"
            uuid = "7876af07-990d-54b4-ab0e-23690620f79a"
            [deps]
            Foo = "00000000-0000-0000-0000-000000000001"
            [weakdeps]
            Foo = "00000000-0000-0000-0000-000000000002"
        "#;
        let toml: ProjectToml = toml::from_str(toml_src).unwrap();
        assert!(validate(&toml).is_err());
    }

    #[test]
    fn project_hash_is_stable_across_round_trip() {
        let toml_src = r#"
            name = "Example"
            uuid = "7876af07-990d-54b4-ab0e-23690620f79a"
            [deps]
            Foo = "00000000-0000-0000-0000-000000000001"
        "#;
        let parsed: ProjectToml = toml::from_str(toml_src).unwrap();
        let h1 = project_hash(&parsed).unwrap();
        let h2 = project_hash(&parsed.clone()).unwrap();
        assert_eq!(h1, h2);
    }
}
