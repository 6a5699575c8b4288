//! Workspace aggregation: when a project's `[workspace]` lists
//! sub-projects, their `deps`/`weakdeps`/`compat` are unioned for
//! resolution, and nested workspaces merge transitively into the root.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use uuid::Uuid;

use super::{read_project, Project};

/// The unioned requirements across a root project and every (transitive)
/// workspace member.
#[derive(Debug, Default)]
pub struct MergedRequirements {
    pub deps: BTreeMap<String, Uuid>,
    pub weakdeps: BTreeMap<String, Uuid>,
    /// Raw compat range strings. Root-project entries win over member
    /// entries for the same name — the nested-workspace/compat interplay
    /// decision recorded in DESIGN.md.
    pub compat: BTreeMap<String, String>,
}

/// Loads `root` plus every workspace member it lists (recursively, since
/// members may themselves declare `[workspace]`), and unions their
/// requirements.
pub fn merged_requirements(root: &Project) -> Result<MergedRequirements> {
    let mut merged = MergedRequirements::default();
    let mut visited = std::collections::HashSet::new();
    collect(root, &mut merged, &mut visited, true)?;
    Ok(merged)
}

fn collect(
    project: &Project,
    merged: &mut MergedRequirements,
    visited: &mut std::collections::HashSet<PathBuf>,
    is_root: bool,
) -> Result<()> {
    let canonical = project
        .path
        .canonicalize()
        .unwrap_or_else(|_| project.path.clone());
    if !visited.insert(canonical) {
        return Ok(());
    }

    merged.deps.extend(project.toml.deps.clone());
    merged.weakdeps.extend(project.toml.weakdeps.clone());
    for (name, range) in &project.toml.compat {
        if is_root {
            merged.compat.insert(name.clone(), range.clone());
        } else {
            merged.compat.entry(name.clone()).or_insert_with(|| range.clone());
        }
    }

    if let Some(ws) = &project.toml.workspace {
        let base_dir = project.path.parent().unwrap_or_else(|| Path::new("."));
        for rel in &ws.projects {
            let member_path = base_dir.join(rel);
            let member = read_project(&member_path)?;
            collect(&member, merged, visited, false)?;
        }
    }
    Ok(())
}
