//! Trait boundaries for the collaborators this core deliberately leaves
//! external: HTTPS transport, git fetch, tarball extraction, and REPL
//! shell output. Mirrors the way cargo isolates its `Config`/`Shell` and
//! transport layers so the resolver/depot logic is testable without a
//! network or a git binary.

use std::path::Path;

use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http status {status} fetching {url}")]
    Http { url: String, status: u16 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub trait Fetcher: Send + Sync {
    fn get(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

pub trait GitFetch: Send + Sync {
    fn fetch(&self, url: &Url, rev: &str, dest: &Path) -> Result<(), FetchError>;
}

pub trait Archive: Send + Sync {
    fn extract(&self, tarball: &Path, dest: &Path) -> std::io::Result<()>;
}

pub trait Shell: Send + Sync {
    fn status(&self, verb: &str, message: &str);
    fn warn(&self, message: &str);
}

/// A `Shell` that routes through `tracing`, used when no REPL front end is
/// attached (e.g. the `pkg` CLI, or tests).
#[derive(Debug, Default)]
pub struct TracingShell;

impl Shell for TracingShell {
    fn status(&self, verb: &str, message: &str) {
        tracing::info!("{verb}: {message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }
}
