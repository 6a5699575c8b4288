//! Top-level operations (§4.8): each follows the same envelope — load
//! environment, build resolver input, resolve under preserve tiers,
//! diff against the current manifest, install, write files, record
//! usage — with a bounded undo/redo session history over (project,
//! manifest) snapshot pairs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use semver::Version;
use url::Url;

use pkgcore_schemas::{ManifestEntry, ManifestToml, ProjectToml};
use uuid::Uuid;

use crate::artifact;
use crate::context::Context;
use crate::depot::{Depot, EntryKind};
use crate::download::{self, DownloadItem};
use crate::error::{Error, Result};
use crate::external::{Fetcher, Shell};
use crate::manifest;
use crate::project::{self, merged_requirements, Project};
use crate::registry::{PackageEntry, Registry};
use crate::resolver::{self, PackageSource, ResolveRequest, Resolution};

const HISTORY_LIMIT: usize = 50;

/// Adapts zero or more federated registries into a single `PackageSource`:
/// a candidate is sought in each registry in turn, and versions known to
/// more than one are unioned. Mutual-trust enforcement happens at
/// refresh time (`crate::trust::check_trust`), not during lookup — by the
/// time a registry is in this set it has already been accepted.
pub struct RegistrySet {
    pub registries: Vec<Registry>,
    allow_registry_extension: bool,
}

impl RegistrySet {
    /// Opens every subdirectory of `depot.writable_root()/registries` as
    /// a registry (§3: "Depot ... `registries/` holds installed
    /// registries").
    pub fn open_installed(depot: &Depot, allow_registry_extension: bool) -> anyhow::Result<RegistrySet> {
        let root = depot.writable_root().join("registries");
        let mut registries = Vec::new();
        if root.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(&root)
                .with_context(|| format!("listing `{}`", root.display()))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .collect();
            entries.sort();
            for path in entries {
                registries.push(Registry::open(&path)?);
            }
        }
        Ok(RegistrySet { registries, allow_registry_extension })
    }
}

impl RegistrySet {
    pub fn name_hint(&self, uuid: Uuid) -> Option<String> {
        self.registries
            .iter()
            .find_map(|r| r.name_of(uuid).map(str::to_string))
    }
}

impl PackageSource for RegistrySet {
    fn versions(&mut self, uuid: Uuid) -> anyhow::Result<Vec<Version>> {
        let mut combined = Vec::new();
        for registry in &self.registries {
            if let Ok(versions) = registry.versions(uuid) {
                combined.extend(versions);
            }
        }
        combined.sort();
        combined.dedup();
        combined.sort_by(|a, b| b.cmp(a));
        Ok(combined)
    }

    /// Looks up `uuid@version` in every registry that has it. Per §4.9,
    /// checks mutual trust between the first ("incumbent") registry found
    /// and every other registry also co-serving this package, downgrading
    /// a violation to a warning by default (the way `check_trust`'s own
    /// contract documents) unless `allow_registry_extension` is set, in
    /// which case it never fires. Per §4.3, when registries disagree on
    /// the tree hash for this exact version, `newer_hash` picks a winner
    /// from each registry's known-hash set for the package.
    fn entry(&mut self, uuid: Uuid, version: &Version) -> anyhow::Result<PackageEntry> {
        let mut found: Vec<(Uuid, std::collections::HashSet<Uuid>, Vec<String>, PackageEntry)> = Vec::new();
        let mut last_err = None;
        for registry in &mut self.registries {
            match registry.lookup(uuid, version) {
                Ok(entry) => {
                    let trusted = registry.trusted_registries_for(uuid).iter().copied().collect();
                    let known = registry.known_tree_hashes(uuid).unwrap_or_default();
                    found.push((registry.uuid, trusted, known, entry));
                }
                Err(e) => last_err = Some(e),
            }
        }
        let Some((incumbent_registry, incumbent_trusted, incumbent_known, incumbent_entry)) = found.first().cloned()
        else {
            return Err(
                last_err.unwrap_or_else(|| anyhow::anyhow!("package {uuid}@{version} not found in any registry")),
            );
        };
        let mut winner = incumbent_entry;
        let mut winner_known = incumbent_known;
        for (candidate_registry, candidate_trusted, candidate_known, candidate_entry) in found.iter().skip(1) {
            if let Err(e) = crate::trust::check_trust(
                uuid,
                *candidate_registry,
                candidate_trusted,
                incumbent_registry,
                &incumbent_trusted,
                self.allow_registry_extension,
            ) {
                tracing::warn!(%uuid, %version, error = %e, "registry trust violation downgraded to warning");
            }
            if candidate_entry.tree_hash != winner.tree_hash {
                let newer =
                    crate::registry::newer_hash(&winner.tree_hash, &winner_known, &candidate_entry.tree_hash, candidate_known);
                if newer == candidate_entry.tree_hash {
                    winner = candidate_entry.clone();
                    winner_known = candidate_known.clone();
                }
            }
        }
        Ok(winner)
    }
}

/// A loaded project/manifest pair plus the collaborators every operation
/// needs: the depot, the registry set, and ambient settings.
pub struct Environment {
    pub context: Context,
    pub depot: Depot,
    pub registries: RegistrySet,
    pub project_dir: PathBuf,
    pub project: Project,
    pub manifest_path: PathBuf,
    pub manifest: ManifestToml,
    history: Vec<(ProjectToml, ManifestToml)>,
    future: Vec<(ProjectToml, ManifestToml)>,
}

impl Environment {
    pub fn load(project_dir: &Path, context: Context) -> Result<Environment> {
        let project_path = project_dir.join("Project.toml");
        let project = project::read_project(&project_path).map_err(Error::Other)?;
        let manifest_path = manifest::manifest_path_for(project_dir, host_version());
        let manifest = if manifest_path.is_file() {
            manifest::read_manifest(&manifest_path).map_err(Error::Other)?.toml
        } else {
            ManifestToml::new(
                host_version().to_string(),
                project::project_hash(&project.toml).map_err(Error::Other)?,
            )
        };
        let depot = Depot::new(context.depot_path.clone());
        let registries =
            RegistrySet::open_installed(&depot, context.allow_registry_extension).map_err(Error::Other)?;
        Ok(Environment {
            context,
            depot,
            registries,
            project_dir: project_dir.to_path_buf(),
            project,
            manifest_path,
            manifest,
            history: Vec::new(),
            future: Vec::new(),
        })
    }

    fn snapshot(&mut self) {
        self.history.push((self.project.toml.clone(), self.manifest.clone()));
        if self.history.len() > HISTORY_LIMIT {
            self.history.remove(0);
        }
        self.future.clear();
    }

    /// Swaps in the previous (project, manifest) pair, if any, pushing
    /// the current pair onto the redo stack.
    pub fn undo(&mut self) -> Result<bool> {
        let Some(prev) = self.history.pop() else {
            return Ok(false);
        };
        self.future.push((self.project.toml.clone(), self.manifest.clone()));
        self.project.toml = prev.0;
        self.manifest = prev.1;
        self.persist()?;
        self.instantiate(&NullFetcher, &crate::external::TracingShell)?;
        Ok(true)
    }

    pub fn redo(&mut self) -> Result<bool> {
        let Some(next) = self.future.pop() else {
            return Ok(false);
        };
        self.history.push((self.project.toml.clone(), self.manifest.clone()));
        self.project.toml = next.0;
        self.manifest = next.1;
        self.persist()?;
        self.instantiate(&NullFetcher, &crate::external::TracingShell)?;
        Ok(true)
    }

    fn persist(&self) -> Result<()> {
        project::write_project(&self.project.path, &self.project.toml).map_err(Error::Other)?;
        manifest::write_manifest(&self.manifest_path, &self.manifest).map_err(Error::Other)
    }

    fn record_usage(&self) -> Result<()> {
        let now = now_unix();
        self.depot.record_usage(&self.manifest_path, now).map_err(Error::Other)
    }

    /// Builds a `ResolveRequest` from the current (merged-workspace)
    /// project and manifest, re-resolves, diffs the result against the
    /// current manifest, and — unless `preview` — installs everything the
    /// new manifest needs and writes project/manifest/usage.
    fn resolve_and_apply(
        &mut self,
        overrides: impl FnOnce(&mut ResolveRequest),
        fetcher: &dyn Fetcher,
        shell: &dyn Shell,
        preview: bool,
    ) -> Result<Resolution> {
        let merged = merged_requirements(&self.project).map_err(Error::Other)?;
        let mut request = ResolveRequest {
            direct: merged.deps,
            previous: previous_versions(&self.manifest),
            ..Default::default()
        };
        for (name, range_str) in &merged.compat {
            if let Some(&uuid) = request.direct.get(name) {
                if let Ok(range) = crate::version::parse_range(range_str) {
                    request.compat.insert(uuid, range);
                }
            }
        }
        overrides(&mut request);

        let mut resolution = resolver::resolve(
            &mut self.registries,
            &request,
            self.context.resolver_backend,
            Duration::from_secs(60),
        )?;
        resolution.activated_extensions = resolver::activated_extensions(
            &self.project.toml.extensions,
            &self.project.toml.weakdeps,
            &resolution.selected,
        );

        if preview {
            shell.status("Preview", &format!("would resolve {} packages", resolution.selected.len()));
            return Ok(resolution);
        }

        self.snapshot();
        install_resolution(
            &resolution,
            &self.depot,
            &mut self.registries,
            fetcher,
            self.context.offline,
            self.context.pkg_server.as_deref(),
        )?;
        let project_hash = project::project_hash(&self.project.toml).map_err(Error::Other)?;
        self.manifest = build_manifest(&self.manifest, &resolution, &request, project_hash);
        self.persist()?;
        self.record_usage()?;
        shell.status("Resolved", &format!("{} packages", resolution.selected.len()));
        if !resolution.activated_extensions.is_empty() {
            let names = resolution.activated_extensions.iter().cloned().collect::<Vec<_>>().join(", ");
            shell.status("Activated", &names);
        }
        Ok(resolution)
    }

    /// `add(specs, preserve=tiered)`.
    pub fn add(&mut self, specs: &[(String, Uuid)], fetcher: &dyn Fetcher, shell: &dyn Shell) -> Result<Resolution> {
        for (name, uuid) in specs {
            self.project.toml.deps.insert(name.clone(), *uuid);
        }
        self.resolve_and_apply(|_| {}, fetcher, shell, false)
    }

    /// `rm(specs, mode)`: `mode=project` drops a direct requirement;
    /// `mode=manifest` does the same but also stops treating its
    /// transitive closure as required. Since every resolve rebuilds the
    /// manifest from scratch from the new resolution (§4.8's diff step),
    /// both modes converge on the same re-resolved manifest — the
    /// distinction only matters for *which* names the caller is still
    /// allowed to reference directly afterwards, which the caller (the
    /// `pkg` CLI) enforces before calling this.
    pub fn rm(&mut self, names: &[String], fetcher: &dyn Fetcher, shell: &dyn Shell) -> Result<Resolution> {
        for name in names {
            self.project.toml.deps.remove(name);
            self.project.toml.weakdeps.remove(name);
        }
        self.resolve_and_apply(|_| {}, fetcher, shell, false)
    }

    /// `pin(specs)`: forces the current resolved version; `free(specs)`
    /// (pinned=false) lifts it back to normal resolution.
    pub fn set_pinned(
        &mut self,
        names: &[String],
        pinned: bool,
        fetcher: &dyn Fetcher,
        shell: &dyn Shell,
    ) -> Result<Resolution> {
        let targets: Vec<Uuid> = names
            .iter()
            .filter_map(|n| self.project.toml.deps.get(n).copied())
            .collect();
        let previous = previous_versions(&self.manifest);
        self.resolve_and_apply(
            |request| {
                for uuid in &targets {
                    if pinned {
                        if let Some(v) = previous.get(uuid) {
                            request.pinned.insert(*uuid, v.clone());
                        }
                    } else {
                        request.pinned.remove(uuid);
                    }
                }
            },
            fetcher,
            shell,
            false,
        )
    }

    /// `update(specs?, level)`: drops the preserve constraint for the
    /// named targets (or everything, if `specs` is empty) down to
    /// `level`, then re-resolves.
    pub fn update(
        &mut self,
        names: &[String],
        level: UpdateLevel,
        fetcher: &dyn Fetcher,
        shell: &dyn Shell,
    ) -> Result<Resolution> {
        let targets: Vec<Uuid> = if names.is_empty() {
            self.project.toml.deps.values().copied().collect()
        } else {
            names
                .iter()
                .filter_map(|n| self.project.toml.deps.get(n).copied())
                .collect()
        };
        self.resolve_and_apply(
            |request| {
                for uuid in &targets {
                    if let Some(current) = request.previous.get(uuid).cloned() {
                        if let Some(range) = level.range_from(&current) {
                            request.compat.insert(*uuid, range);
                        } else {
                            request.previous.remove(uuid);
                        }
                    }
                }
            },
            fetcher,
            shell,
            false,
        )
    }

    /// `develop(specs)`: records a path-tracked dependency rooted at
    /// `dev_dir`/name, then re-resolves using that path's own deps.
    pub fn develop(
        &mut self,
        name: &str,
        uuid: Uuid,
        checkout: &Path,
        fetcher: &dyn Fetcher,
        shell: &dyn Shell,
    ) -> Result<Resolution> {
        self.project.toml.deps.insert(name.to_string(), uuid);
        let path_deps = project::read_project(&checkout.join("Project.toml"))
            .map(|p| p.toml.deps)
            .unwrap_or_default();
        self.resolve_and_apply(
            |request| {
                request.path_tracked.insert(uuid, path_deps);
            },
            fetcher,
            shell,
            false,
        )
    }

    /// `instantiate()`: ensure the current manifest's packages and
    /// artifacts exist in the depot without re-resolving, unless the
    /// manifest is missing or stale against the project.
    pub fn instantiate(&mut self, fetcher: &dyn Fetcher, shell: &dyn Shell) -> Result<()> {
        let current = manifest::is_current(&self.manifest, &self.project.toml).map_err(Error::Other)?;
        if !current {
            self.resolve_and_apply(|_| {}, fetcher, shell, false)?;
            return Ok(());
        }
        ensure_manifest_installed(
            &self.manifest,
            &self.depot,
            fetcher,
            self.context.offline,
            self.context.pkg_server.as_deref(),
        )?;
        self.record_usage()?;
        shell.status("Instantiated", &self.project_dir.display().to_string());
        Ok(())
    }

    /// `resolve()`: re-resolve only if stale.
    pub fn resolve(&mut self, fetcher: &dyn Fetcher, shell: &dyn Shell) -> Result<Option<Resolution>> {
        let current = manifest::is_current(&self.manifest, &self.project.toml).map_err(Error::Other)?;
        if current {
            return Ok(None);
        }
        Ok(Some(self.resolve_and_apply(|_| {}, fetcher, shell, false)?))
    }

    /// `preview(op)`: anything routed through `resolve_and_apply(..,
    /// preview: true)` stops before installation or any file write.
    pub fn preview_add(&mut self, specs: &[(String, Uuid)], shell: &dyn Shell) -> Result<Resolution> {
        let mut scratch = self.project.toml.clone();
        for (name, uuid) in specs {
            scratch.deps.insert(name.clone(), *uuid);
        }
        let saved = std::mem::replace(&mut self.project.toml, scratch);
        let result = self.resolve_and_apply(|_| {}, &NullFetcher, shell, true);
        self.project.toml = saved;
        result
    }

    pub fn gc(&self, collect_delay: Duration, dry_run: bool) -> Result<crate::depot::GcReport> {
        self.depot.gc(collect_delay, now_unix(), dry_run).map_err(Error::Other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateLevel {
    Fixed,
    Patch,
    Minor,
    Major,
}

impl UpdateLevel {
    /// The compat range this level still permits, starting from
    /// `current`; `None` means "no constraint" (major/unrestricted).
    fn range_from(&self, current: &Version) -> Option<crate::version::VersionRange> {
        let spec = match self {
            UpdateLevel::Fixed => return Some(crate::version::VersionRange::exact(current.clone())),
            UpdateLevel::Patch => format!("~{current}"),
            UpdateLevel::Minor => format!("^{current}"),
            UpdateLevel::Major => return None,
        };
        crate::version::parse_range(&spec).ok()
    }
}

fn previous_versions(manifest: &ManifestToml) -> BTreeMap<Uuid, Version> {
    let mut out = BTreeMap::new();
    for entries in manifest.deps.values() {
        for entry in entries {
            if let Some(version) = &entry.version {
                out.insert(entry.uuid, version.clone());
            }
        }
    }
    out
}

fn build_manifest(
    previous: &ManifestToml,
    resolution: &Resolution,
    request: &ResolveRequest,
    project_hash: String,
) -> ManifestToml {
    let mut deps: BTreeMap<String, Vec<ManifestEntry>> = BTreeMap::new();
    let name_of: BTreeMap<Uuid, String> = request
        .direct
        .iter()
        .map(|(name, uuid)| (*uuid, name.clone()))
        .collect();
    for (uuid, entry) in &resolution.selected {
        let name = name_of.get(uuid).cloned().unwrap_or_else(|| uuid.to_string());
        let dep_names: Vec<String> = entry.deps.keys().cloned().collect();
        let was_pinned = previous
            .deps
            .values()
            .flatten()
            .any(|e| e.uuid == *uuid && e.pinned);
        deps.entry(name).or_default().push(ManifestEntry {
            uuid: *uuid,
            version: Some(entry.version.clone()),
            git_tree_sha1: Some(entry.tree_hash.clone()),
            deps: dep_names,
            repo_url: None,
            repo_rev: None,
            path: None,
            pinned: was_pinned || request.pinned.contains_key(uuid),
        });
    }
    ManifestToml {
        julia_version: Some(host_version().to_string()),
        manifest_format: pkgcore_schemas::CURRENT_MANIFEST_FORMAT.to_string(),
        project_hash: Some(project_hash),
        deps,
    }
}

/// Installs every package a freshly-computed resolution selected that
/// isn't already in the depot, then ensures each installed package's
/// non-lazy artifacts (§4.5) are installed too.
fn install_resolution(
    resolution: &Resolution,
    depot: &Depot,
    registries: &mut RegistrySet,
    fetcher: &dyn Fetcher,
    offline: bool,
    pkg_server: Option<&str>,
) -> Result<()> {
    for (uuid, entry) in &resolution.selected {
        let name = registries.name_hint(*uuid).unwrap_or_else(|| uuid.to_string());
        let existing = depot
            .resolve_path(EntryKind::Package, Some(&name), &entry.tree_hash)
            .map_err(Error::Other)?;
        let pkg_dir = match existing {
            Some(path) => path,
            None => {
                if offline {
                    return Err(Error::Offline(entry.tree_hash.clone()));
                }
                let mirrors = package_mirrors(pkg_server, *uuid, &entry.tree_hash);
                if mirrors.is_empty() {
                    return Err(Error::NotFound {
                        kind: "package",
                        id: format!("{uuid}@{}", entry.version),
                    });
                }
                let item = DownloadItem {
                    bundle_url: None,
                    mirrors,
                    expected_hash: entry.tree_hash.clone(),
                };
                let bytes = download::fetch_all(vec![item], &BoxedFetcher(fetcher), 1, Duration::from_secs(120))
                    .into_iter()
                    .next()
                    .unwrap()
                    .map_err(|e| Error::Other(anyhow::anyhow!(e)))?;
                depot
                    .install_package(&name, *uuid, &entry.tree_hash, &bytes[..])
                    .map_err(Error::Other)?
            }
        };
        ensure_package_artifacts_installed(&pkg_dir, depot, fetcher, offline)?;
    }
    Ok(())
}

fn ensure_manifest_installed(
    manifest: &ManifestToml,
    depot: &Depot,
    fetcher: &dyn Fetcher,
    offline: bool,
    pkg_server: Option<&str>,
) -> Result<()> {
    for (name, entries) in &manifest.deps {
        for entry in entries {
            let Some(hash) = &entry.git_tree_sha1 else { continue };
            let existing = depot.resolve_path(EntryKind::Package, Some(name), hash).map_err(Error::Other)?;
            let pkg_dir = match existing {
                Some(path) => path,
                None => {
                    if offline {
                        return Err(Error::Offline(hash.clone()));
                    }
                    let mirrors = package_mirrors(pkg_server, entry.uuid, hash);
                    if mirrors.is_empty() {
                        return Err(Error::NotFound {
                            kind: "package",
                            id: format!("{}@{hash}", entry.uuid),
                        });
                    }
                    let item = DownloadItem {
                        bundle_url: None,
                        mirrors,
                        expected_hash: hash.clone(),
                    };
                    let bytes = download::fetch_all(vec![item], &BoxedFetcher(fetcher), 1, Duration::from_secs(120))
                        .into_iter()
                        .next()
                        .unwrap()
                        .map_err(|e| Error::Other(anyhow::anyhow!(e)))?;
                    depot.install_package(name, entry.uuid, hash, &bytes[..]).map_err(Error::Other)?
                }
            };
            ensure_package_artifacts_installed(&pkg_dir, depot, fetcher, offline)?;
        }
    }
    Ok(())
}

/// Reads an installed package directory's `Artifacts.toml`, if any, and
/// ensures every binding the host platform selects is installed in the
/// depot — skipping `lazy` entries, which are only ensured at first
/// access (§4.5, §4.8).
fn ensure_package_artifacts_installed(
    pkg_dir: &Path,
    depot: &Depot,
    fetcher: &dyn Fetcher,
    offline: bool,
) -> Result<()> {
    let artifacts_path = pkg_dir.join("Artifacts.toml");
    if !artifacts_path.is_file() {
        return Ok(());
    }
    let bindings = artifact::read_artifacts(&artifacts_path).map_err(Error::Other)?;
    let host = pkgcore_platform::HostPlatform::current();
    for name in bindings.0.keys() {
        let Some(entry) = artifact::select(&bindings, name, &host).map_err(Error::Other)? else {
            continue;
        };
        if entry.lazy {
            continue;
        }
        artifact::ensure_installed(entry, depot, fetcher, offline)?;
    }
    Ok(())
}

/// The PkgServer protocol convention: `/package/$uuid/$tree_hash`. With
/// no `JULIA_PKG_SERVER` configured, there is nowhere to fetch an
/// uninstalled package from; callers surface that as `NotFound`.
fn package_mirrors(server: Option<&str>, uuid: Uuid, tree_hash: &str) -> Vec<Url> {
    let Some(server) = server else {
        return Vec::new();
    };
    Url::parse(&format!("{}/package/{uuid}/{tree_hash}", server.trim_end_matches('/')))
        .into_iter()
        .collect()
}

fn host_version() -> &'static str {
    "1.10.0"
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A `Fetcher` that always fails, for code paths (preview, undo/redo of a
/// state already fully installed) that must not perform real I/O.
struct NullFetcher;

impl Fetcher for NullFetcher {
    fn get(&self, url: &Url) -> std::result::Result<Vec<u8>, crate::external::FetchError> {
        Err(crate::external::FetchError::Http {
            url: url.to_string(),
            status: 0,
        })
    }
}

/// Adapts a borrowed `&dyn Fetcher` to the `Arc<dyn Fetcher>` the download
/// orchestrator's thread-scoped concurrency wants, for the common case
/// where an operation's fetcher outlives the single `fetch_all` call.
struct BoxedFetcher<'a>(&'a dyn Fetcher);

impl Fetcher for BoxedFetcher<'_> {
    fn get(&self, url: &Url) -> std::result::Result<Vec<u8>, crate::external::FetchError> {
        self.0.get(url)
    }
}
