//! Artifact bindings (§4.5): platform-specific selection among tagged
//! entries, lazy-on-first-access installation, and binding-file mutation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use url::Url;

use pkgcore_platform::HostPlatform;
use pkgcore_schemas::{ArtifactBindingValue, ArtifactEntry, ArtifactsToml, DownloadSpec};

use crate::depot::{Depot, EntryKind};
use crate::error::{Error, Result};
use crate::external::Fetcher;

pub fn read_artifacts(path: &Path) -> anyhow::Result<ArtifactsToml> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading artifacts file `{}`", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing artifacts file `{}`", path.display()))
}

pub fn write_artifacts(path: &Path, toml: &ArtifactsToml) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(toml).context("serializing artifacts file")?;
    pkgcore_util::paths::write_atomic(path, &rendered)
}

/// Picks the entry among `name`'s bindings whose predicate set most
/// specifically matches `host`; `Ok(None)` if `name` is unbound or no
/// entry matches, `Err` on an ambiguous tie (§4.5).
pub fn select<'a>(
    binding: &'a ArtifactsToml,
    name: &str,
    host: &HostPlatform,
) -> anyhow::Result<Option<&'a ArtifactEntry>> {
    let Some(value) = binding.0.get(name) else {
        return Ok(None);
    };
    let entries = value.entries();
    let maps: Vec<BTreeMap<String, String>> = entries.iter().map(predicate_map).collect();
    let candidates = maps.iter().zip(entries.iter());
    pkgcore_platform::select_most_specific(candidates, host)
        .map_err(|e| anyhow::anyhow!("selecting artifact `{name}`: {e}"))
}

fn predicate_map(entry: &ArtifactEntry) -> BTreeMap<String, String> {
    let mut m = entry.extra.clone();
    if let Some(os) = &entry.os {
        m.insert("os".to_string(), os.clone());
    }
    if let Some(arch) = &entry.arch {
        m.insert("arch".to_string(), arch.clone());
    }
    if let Some(libc) = &entry.libc {
        m.insert("libc".to_string(), libc.clone());
    }
    m
}

/// Ensures `entry` is present in the depot, downloading it if necessary.
/// `lazy` entries are only ever ensured here, at first access — never
/// during environment instantiation (the caller enforces that timing).
pub fn ensure_installed(
    entry: &ArtifactEntry,
    depot: &Depot,
    fetcher: &dyn Fetcher,
    offline: bool,
) -> Result<PathBuf> {
    if let Some(path) = depot
        .resolve_path(EntryKind::Artifact, None, &entry.git_tree_sha1)
        .map_err(Error::Other)?
    {
        return Ok(path);
    }
    if offline {
        return Err(Error::Offline(entry.git_tree_sha1.clone()));
    }

    let mut last_error = None;
    for spec in &entry.download {
        match try_one_mirror(entry, spec, depot, fetcher) {
            Ok(path) => return Ok(path),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| Error::NotFound {
        kind: "artifact",
        id: entry.git_tree_sha1.clone(),
    }))
}

fn try_one_mirror(
    entry: &ArtifactEntry,
    spec: &DownloadSpec,
    depot: &Depot,
    fetcher: &dyn Fetcher,
) -> Result<PathBuf> {
    let url = Url::parse(&spec.url)
        .with_context(|| format!("malformed artifact download url `{}`", spec.url))
        .map_err(Error::Other)?;
    let bytes = fetcher.get(&url).map_err(|e| Error::Other(e.into()))?;
    let got_ok = crate::hash::verify_tarball(&bytes[..], &spec.sha256).map_err(Error::Other)?;
    if !got_ok {
        return Err(Error::HashMismatch {
            expected: spec.sha256.clone(),
            got: "<mismatch>".to_string(),
            origin: spec.url.clone(),
        });
    }
    depot
        .install_artifact(&entry.git_tree_sha1, &bytes[..])
        .map_err(Error::Other)
}

pub fn bind_artifact(
    toml: &mut ArtifactsToml,
    name: &str,
    hash: String,
    download: Vec<DownloadSpec>,
) {
    let entry = ArtifactEntry {
        git_tree_sha1: hash,
        download,
        lazy: false,
        os: None,
        arch: None,
        libc: None,
        extra: BTreeMap::new(),
    };
    toml.0.insert(name.to_string(), ArtifactBindingValue::Single(entry));
}

pub fn unbind_artifact(toml: &mut ArtifactsToml, name: &str) {
    toml.0.remove(name);
}
