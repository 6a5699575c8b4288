//! The error taxonomy from the design: one kind per failure mode the core
//! can hit, not one variant per call site. Operation-layer functions return
//! `Result<T, Error>`; lower layers that need ad-hoc context use `anyhow`
//! and get converted at the boundary via `Error::IoError`/`Error::ConfigError`.

use std::path::PathBuf;

use crate::resolver::diagnostic::ConflictCore;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsatisfiable dependency constraints:\n{0}")]
    ResolverUnsat(ConflictCore),

    #[error("resolution did not complete within its step/time budget")]
    ResolverUnknown,

    #[error("hash mismatch for {origin}: expected {expected}, got {got}")]
    HashMismatch {
        expected: String,
        got: String,
        origin: String,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("offline mode blocks fetching {0}")]
    Offline(String),

    #[error("registry trust violation for {uuid}: registries {registries:?} do not mutually trust each other")]
    TrustViolation {
        uuid: Uuid,
        registries: Vec<Uuid>,
    },

    #[error("depot corruption detected at {0}; entry quarantined")]
    Corruption(PathBuf),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("malformed config at {path}: {detail}")]
    ConfigError { path: PathBuf, detail: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
