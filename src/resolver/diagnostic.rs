//! Conflict diagnostics: on UNSAT, a tree citing a minimal conflicting
//! subset of constraints and their origins. `Display` formatting here is
//! UX-only, not a contract other modules may rely on.

use std::fmt;

use uuid::Uuid;

use crate::version::VersionRange;

/// Where a constraint on a package came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintOrigin {
    /// The project's own `deps`/`compat` tables.
    DirectRequirement,
    /// A compat entry recorded against a specific (package, version).
    CompatEntry { from: Uuid, version: String },
    /// Reached only by following another package's dependency edge.
    Transitive { via: Uuid },
    /// The project pinned this package to an exact version.
    Pinned,
    /// The host language version range (`julia = ...`).
    HostVersion,
}

impl fmt::Display for ConstraintOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintOrigin::DirectRequirement => write!(f, "direct requirement"),
            ConstraintOrigin::CompatEntry { from, version } => {
                write!(f, "compat entry of {from}@{version}")
            }
            ConstraintOrigin::Transitive { via } => write!(f, "transitive via {via}"),
            ConstraintOrigin::Pinned => write!(f, "pinned"),
            ConstraintOrigin::HostVersion => write!(f, "host version"),
        }
    }
}

/// One edge in the conflict tree: package `uuid` was constrained to
/// `range` by `origin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintEdge {
    pub uuid: Uuid,
    pub range: VersionRange,
    pub origin: ConstraintOrigin,
}

/// The minimal conflicting subset extracted from the solver, rooted at
/// whichever package has no remaining satisfying version once every edge
/// in `edges` is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictCore {
    pub root: Uuid,
    pub edges: Vec<ConstraintEdge>,
}

impl fmt::Display for ConflictCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "no version of {} satisfies every constraint:", self.root)?;
        for edge in &self.edges {
            writeln!(f, "  - {} requires {} ({})", edge.origin, edge.range, edge.uuid)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::parse_range;

    #[test]
    fn display_cites_every_edge_in_the_core() {
        let root = Uuid::from_u128(1);
        let dep = Uuid::from_u128(2);
        let core = ConflictCore {
            root,
            edges: vec![
                ConstraintEdge {
                    uuid: dep,
                    range: parse_range("^1.0.0").unwrap(),
                    origin: ConstraintOrigin::DirectRequirement,
                },
                ConstraintEdge {
                    uuid: dep,
                    range: parse_range("^2.0.0").unwrap(),
                    origin: ConstraintOrigin::Transitive { via: root },
                },
            ],
        };
        let rendered = core.to_string();
        assert!(rendered.contains("direct requirement"));
        assert!(rendered.contains("transitive via"));
    }
}
