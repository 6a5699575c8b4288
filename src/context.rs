//! Explicit, threaded-through context replacing process-wide globals
//! (Design Notes §9: "Global mutable state ... is modeled as an explicit
//! context struct threaded through operations; no hidden process-wide
//! singletons").

use std::path::PathBuf;

use crate::trust::ResolverBackend;

/// `conservative` prefers the currently-locked registry/artifact origin;
/// `eager` prefers whatever a package server advertises as newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPreference {
    Conservative,
    Eager,
}

/// Everything operations need that would otherwise be a global: derived
/// from environment variables at startup (§6) but never read from the
/// environment again once constructed.
#[derive(Debug, Clone)]
pub struct Context {
    /// `DEPOT_PATH`-equivalent: first entry is writable, the rest
    /// read-only fallbacks.
    pub depot_path: Vec<PathBuf>,
    /// Environment stack for code loading, outermost first.
    pub load_path: Vec<PathBuf>,
    pub offline: bool,
    pub unpack_registry: bool,
    pub concurrent_downloads: usize,
    /// Preferred registry/artifact origin; `None` disables server-backed
    /// fetching entirely (falls back to direct git/registry sources).
    pub pkg_server: Option<String>,
    pub server_preference: ServerPreference,
    pub dev_dir: PathBuf,
    pub allow_registry_extension: bool,
    pub resolver_backend: ResolverBackend,
}

impl Context {
    pub fn writable_depot(&self) -> &PathBuf {
        self.depot_path
            .first()
            .expect("depot_path must have at least one entry")
    }

    /// Construct from the environment variables named in §6, applying the
    /// documented defaults when unset.
    pub fn from_env() -> Self {
        let depot_path = std::env::var_os("JULIA_DEPOT_PATH")
            .map(|v| std::env::split_paths(&v).collect::<Vec<_>>())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_depot_path);
        let load_path = std::env::var_os("JULIA_LOAD_PATH")
            .map(|v| std::env::split_paths(&v).collect::<Vec<_>>())
            .unwrap_or_default();
        let offline = bool_env("JULIA_PKG_OFFLINE");
        let unpack_registry = bool_env("JULIA_PKG_UNPACK_REGISTRY");
        let concurrent_downloads = std::env::var("JULIA_PKG_CONCURRENT_DOWNLOADS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8);
        let pkg_server = std::env::var("JULIA_PKG_SERVER")
            .ok()
            .filter(|v| !v.is_empty());
        let server_preference = match std::env::var("JULIA_PKG_SERVER_REGISTRY_PREFERENCE").as_deref() {
            Ok("eager") => ServerPreference::Eager,
            _ => ServerPreference::Conservative,
        };
        let dev_dir = std::env::var_os("JULIA_PKG_DEVDIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| depot_path[0].join("dev"));
        Context {
            depot_path,
            load_path,
            offline,
            unpack_registry,
            concurrent_downloads,
            pkg_server,
            server_preference,
            dev_dir,
            allow_registry_extension: false,
            resolver_backend: ResolverBackend::Sat,
        }
    }
}

fn bool_env(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn default_depot_path() -> Vec<PathBuf> {
    let home = home::home_dir().unwrap_or_else(|| PathBuf::from("."));
    vec![home.join(".local/share/pkgcore")]
}
