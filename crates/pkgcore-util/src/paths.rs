//! Filesystem helpers that make "install by rename" safe and portable.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Create `dir` and all of its parents, tolerating the "already exists" case.
pub fn create_dir_all(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("failed to create directory `{}`", dir.display()))
}

/// Returns a path in the same parent directory as `target`, suitable as a
/// staging area for an atomic rename into `target`.
///
/// Keeping the staging path on the same filesystem as `target` is what makes
/// the final `rename` atomic; callers must not construct staging paths in a
/// different directory.
pub fn sibling_temp_path(target: &Path, suffix: &str) -> PathBuf {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("entry");
    parent.join(format!(".{name}.{suffix}.tmp"))
}

/// Atomically install `staged` at `target`, replacing nothing if `target`
/// already exists (the caller is expected to have already decided, via a
/// lock, that it owns this installation).
pub fn atomic_rename(staged: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        create_dir_all(parent)?;
    }
    fs::rename(staged, target).with_context(|| {
        format!(
            "failed to rename `{}` to `{}`",
            staged.display(),
            target.display()
        )
    })
}

/// Remove a directory tree, tolerating the "already gone" case.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove `{}`", path.display())),
    }
}

/// Write `contents` to `path` by writing a sibling temp file then renaming
/// it into place, so readers never observe a partially-written file.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let tmp = sibling_temp_path(path, "write");
    fs::write(&tmp, contents)
        .with_context(|| format!("failed to write `{}`", tmp.display()))?;
    atomic_rename(&tmp, path)
}

/// Append a line to a log file, relying on `O_APPEND` semantics so
/// concurrent writers never interleave partial lines.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open `{}` for append", path.display()))?;
    writeln!(f, "{line}").with_context(|| format!("failed to append to `{}`", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_rename_moves_file_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged");
        fs::write(&staged, b"hello").unwrap();
        let target = dir.path().join("sub").join("target");
        atomic_rename(&staged, &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"hello");
        assert!(!staged.exists());
    }

    #[test]
    fn write_atomic_never_leaves_tmp_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("file.toml");
        write_atomic(&target, "a = 1\n").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("file.toml")]);
    }
}
