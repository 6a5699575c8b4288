//! `artifacts/Overrides.toml` resolution: inner depots override outer
//! ones; a replacement hash is resolved recursively; an empty string
//! cancels an outer override rather than leaving it in place (testable
//! property 4, "override monotonicity").

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use pkgcore_schemas::{OverrideEntry, OverridesToml};

const MAX_INDIRECTION: usize = 16;

pub fn resolve_override(roots: &[PathBuf], hash: &str) -> Result<Option<PathBuf>> {
    resolve_override_depth(roots, hash, 0)
}

fn resolve_override_depth(roots: &[PathBuf], hash: &str, depth: usize) -> Result<Option<PathBuf>> {
    if depth >= MAX_INDIRECTION {
        anyhow::bail!("override chain for `{hash}` exceeded {MAX_INDIRECTION} indirections");
    }
    for root in roots {
        let Some(entry) = load(root)?.hashes.get(hash).cloned() else {
            continue;
        };
        return match entry {
            OverrideEntry::Redirect(value) if value.is_empty() => {
                // Cancelled at this layer: stop searching outer layers
                // for this hash, fall back to normal depot search.
                Ok(None)
            }
            OverrideEntry::Redirect(value) => {
                let as_path = Path::new(&value);
                if as_path.is_absolute() {
                    Ok(Some(as_path.to_path_buf()))
                } else {
                    // A replacement content hash: resolve it starting
                    // again from the innermost depot.
                    resolve_override_depth(roots, &value, depth + 1)
                }
            }
            OverrideEntry::PerPackage(_) => Ok(None),
        };
    }
    Ok(None)
}

fn load(root: &Path) -> Result<OverridesToml> {
    let path = root.join("artifacts").join("Overrides.toml");
    match fs::read_to_string(&path) {
        Ok(raw) => Ok(toml::from_str(&raw)?),
        Err(_) => Ok(OverridesToml::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_overrides(root: &Path, contents: &str) {
        let dir = root.join("artifacts");
        fs::create_dir_all(&dir).unwrap();
        let mut f = fs::File::create(dir.join("Overrides.toml")).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn inner_depot_overrides_outer() {
        let inner = tempfile::tempdir().unwrap();
        let outer = tempfile::tempdir().unwrap();
        write_overrides(outer.path(), "deadbeef = \"/opt/outer\"\n");
        write_overrides(inner.path(), "deadbeef = \"/opt/inner\"\n");

        let roots = vec![inner.path().to_path_buf(), outer.path().to_path_buf()];
        let resolved = resolve_override(&roots, "deadbeef").unwrap();
        assert_eq!(resolved, Some(PathBuf::from("/opt/inner")));
    }

    #[test]
    fn empty_string_cancels_the_outer_override() {
        let inner = tempfile::tempdir().unwrap();
        let outer = tempfile::tempdir().unwrap();
        write_overrides(outer.path(), "deadbeef = \"/opt/outer\"\n");
        write_overrides(inner.path(), "deadbeef = \"\"\n");

        let roots = vec![inner.path().to_path_buf(), outer.path().to_path_buf()];
        let resolved = resolve_override(&roots, "deadbeef").unwrap();
        assert_eq!(resolved, None);
    }
}
