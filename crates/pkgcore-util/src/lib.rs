//! Miscellaneous support code shared across the package manager core.
//!
//! Mirrors the shape of a small "util" crate sitting below everything else:
//! no dependency on the resolver, registry, or depot types, just filesystem
//! and hashing primitives they all need.

pub mod hasher;
pub mod lock;
pub mod paths;

pub use hasher::{Sha1Hash, Sha256Hash};
pub use lock::PidFileLock;
