//! Packed (tarball) vs unpacked (directory) registry storage.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;

/// A registry's on-disk backing store.
pub enum RegistrySource {
    Unpacked(PathBuf),
    Packed(PackedArchive),
}

impl RegistrySource {
    /// Read one file's contents, addressed by its path relative to the
    /// registry root, without extracting the rest of the archive.
    pub fn read_to_string(&self, relative: &str) -> Result<String> {
        match self {
            RegistrySource::Unpacked(root) => {
                let path = root.join(relative);
                fs::read_to_string(&path)
                    .with_context(|| format!("reading `{}`", path.display()))
            }
            RegistrySource::Packed(archive) => archive.read_to_string(relative),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            RegistrySource::Unpacked(p) => Some(p),
            RegistrySource::Packed(a) => Some(&a.path),
        }
    }
}

/// A `.tar.gz` registry archive. Held by path; each read streams the
/// archive looking for the requested entry rather than extracting
/// everything up front.
pub struct PackedArchive {
    path: PathBuf,
}

impl PackedArchive {
    pub fn open(path: &Path) -> Result<PackedArchive> {
        if !path.is_file() {
            bail!("registry archive `{}` does not exist", path.display());
        }
        Ok(PackedArchive {
            path: path.to_path_buf(),
        })
    }

    fn read_to_string(&self, relative: &str) -> Result<String> {
        let file = File::open(&self.path)
            .with_context(|| format!("opening registry archive `{}`", self.path.display()))?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.path()?.to_string_lossy() == relative {
                let mut buf = String::new();
                entry.read_to_string(&mut buf)?;
                return Ok(buf);
            }
        }
        bail!(
            "`{}` not found in registry archive `{}`",
            relative,
            self.path.display()
        )
    }
}
