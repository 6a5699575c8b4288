//! The content-addressed depot: immutable package/artifact storage,
//! atomic installation, override resolution, usage logging, and gc.

mod gc;
mod overrides;

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use flate2::read::GzDecoder;
use pkgcore_util::PidFileLock;
use uuid::Uuid;

pub use gc::GcReport;

/// Which subtree of a depot an entry belongs to; `resolve_path` and
/// `install_package`/`install_artifact` both need this to pick the right
/// directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Package,
    Artifact,
}

/// A stack of depot roots; `depots[0]` is writable, the rest read-only
/// fallbacks, matching `DEPOT_PATH` (§6).
pub struct Depot {
    pub roots: Vec<PathBuf>,
}

impl Depot {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        assert!(!roots.is_empty(), "depot stack must have at least one root");
        Depot { roots }
    }

    pub fn writable_root(&self) -> &Path {
        &self.roots[0]
    }

    fn entry_dir(root: &Path, kind: EntryKind, name: Option<&str>, hash: &str) -> PathBuf {
        match kind {
            EntryKind::Package => root
                .join("packages")
                .join(name.unwrap_or("unknown"))
                .join(hash_prefix(hash)),
            EntryKind::Artifact => root.join("artifacts").join(hash),
        }
    }

    /// Extract `tarball` into a temporary sibling directory, verify its
    /// tree hash, then atomically rename it into place. Concurrent
    /// installers of the same hash coordinate via a pidfile lock; a
    /// waiter that acquires the lock after the winner finished simply
    /// observes the completed installation.
    pub fn install_package(
        &self,
        name: &str,
        _uuid: Uuid,
        tree_hash: &str,
        tarball: impl Read,
    ) -> Result<PathBuf> {
        let target = Self::entry_dir(self.writable_root(), EntryKind::Package, Some(name), tree_hash);
        self.install_entry(&target, tree_hash, tarball)
    }

    pub fn install_artifact(&self, tree_hash: &str, tarball: impl Read) -> Result<PathBuf> {
        let target = Self::entry_dir(self.writable_root(), EntryKind::Artifact, None, tree_hash);
        self.install_entry(&target, tree_hash, tarball)
    }

    fn install_entry(&self, target: &Path, tree_hash: &str, tarball: impl Read) -> Result<PathBuf> {
        if target.is_dir() {
            return Ok(target.to_path_buf());
        }
        let lock = PidFileLock::for_target(target);
        let _guard = lock
            .acquire(pkgcore_util::lock::STALE_LOCK_TIMEOUT)
            .context("acquiring depot install lock")?;
        if target.is_dir() {
            // A racing installer finished while we waited for the lock.
            return Ok(target.to_path_buf());
        }

        let staged = pkgcore_util::paths::sibling_temp_path(target, "install");
        pkgcore_util::paths::remove_dir_all_if_exists(&staged)?;
        extract_tarball(tarball, &staged)?;

        let got = crate::hash::tree_hash(&staged, crate::hash::HashFamily::from_hex_len(tree_hash)
            .context("recorded hash is neither 40 nor 64 hex chars")?)?;
        if got != tree_hash {
            pkgcore_util::paths::remove_dir_all_if_exists(&staged)?;
            anyhow::bail!(
                "tree hash mismatch installing into `{}`: expected {tree_hash}, got {got}",
                target.display()
            );
        }
        pkgcore_util::paths::atomic_rename(&staged, target)?;
        Ok(target.to_path_buf())
    }

    /// Resolves a content hash to a path, applying `Overrides.toml` in
    /// depot-stack order (inner/writable first) before falling back to a
    /// plain search of each depot layer.
    pub fn resolve_path(&self, kind: EntryKind, name: Option<&str>, hash: &str) -> Result<Option<PathBuf>> {
        if let Some(overridden) = overrides::resolve_override(&self.roots, hash)? {
            return Ok(Some(overridden));
        }
        for root in &self.roots {
            let candidate = Self::entry_dir(root, kind, name, hash);
            if candidate.exists() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Append a timestamped usage record so `gc` knows this manifest is
    /// still live.
    pub fn record_usage(&self, manifest_path: &Path, now_unix: u64) -> Result<()> {
        let log = self.writable_root().join("logs").join("manifest_usage.toml");
        let line = format!(
            "[[manifest]]\npath = {:?}\ntime = {now_unix}\n",
            manifest_path.display().to_string()
        );
        pkgcore_util::paths::append_line(&log, &line)
    }

    pub fn gc(&self, collect_delay: Duration, now_unix: u64, dry_run: bool) -> Result<GcReport> {
        gc::run(self, collect_delay, now_unix, dry_run)
    }
}

fn hash_prefix(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}

fn extract_tarball(tarball: impl Read, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(tarball));
    archive
        .unpack(dest)
        .with_context(|| format!("extracting tarball into `{}`", dest.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        let tar_bytes = builder.into_inner().unwrap();
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&tar_bytes).unwrap();
        gz.finish().unwrap()
    }

    #[test]
    fn install_package_verifies_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let depot = Depot::new(vec![dir.path().to_path_buf()]);
        let tarball = make_tarball(&[("a.txt", b"hello")]);
        let hash = {
            // compute expected hash from a local extraction, mirroring
            // what the registry would have recorded.
            let scratch = tempfile::tempdir().unwrap();
            extract_tarball(&tarball[..], scratch.path()).unwrap();
            crate::hash::tree_hash(scratch.path(), crate::hash::HashFamily::Modern256).unwrap()
        };
        let installed = depot
            .install_package("Example", Uuid::nil(), &hash, &tarball[..])
            .unwrap();
        assert!(installed.join("a.txt").exists());

        // Installing again is a no-op that returns the same path.
        let installed_again = depot
            .install_package("Example", Uuid::nil(), &hash, &tarball[..])
            .unwrap();
        assert_eq!(installed, installed_again);
    }

    #[test]
    fn install_rejects_hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let depot = Depot::new(vec![dir.path().to_path_buf()]);
        let tarball = make_tarball(&[("a.txt", b"hello")]);
        let wrong_hash = "a".repeat(64);
        let result = depot.install_package("Example", Uuid::nil(), &wrong_hash, &tarball[..]);
        assert!(result.is_err());
    }
}
