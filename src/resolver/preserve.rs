//! Preserve tiers: from strict to permissive, the orchestrator tries each
//! in order until the instance is satisfiable.

use std::collections::BTreeMap;

use semver::Version;
use uuid::Uuid;

use crate::version::{parse_range, VersionRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreserveTier {
    All,
    Direct,
    Semver,
    None,
}

impl PreserveTier {
    /// The default orchestrator order: strictest first.
    pub const TIERED_ORDER: [PreserveTier; 4] = [
        PreserveTier::All,
        PreserveTier::Direct,
        PreserveTier::Semver,
        PreserveTier::None,
    ];
}

impl std::fmt::Display for PreserveTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PreserveTier::All => "all",
            PreserveTier::Direct => "direct",
            PreserveTier::Semver => "semver",
            PreserveTier::None => "none",
        };
        write!(f, "{s}")
    }
}

/// Computes the hard version constraints this tier imposes on top of the
/// baseline (pinned/compat/deps) constraints, given the previously
/// resolved set and which uuids are direct dependencies.
pub fn tier_constraints(
    tier: PreserveTier,
    previous: &BTreeMap<Uuid, Version>,
    direct: &std::collections::BTreeSet<Uuid>,
) -> BTreeMap<Uuid, VersionRange> {
    match tier {
        PreserveTier::All => previous
            .iter()
            .map(|(uuid, v)| (*uuid, VersionRange::exact(v.clone())))
            .collect(),
        PreserveTier::Direct => previous
            .iter()
            .filter(|(uuid, _)| direct.contains(uuid))
            .map(|(uuid, v)| (*uuid, VersionRange::exact(v.clone())))
            .collect(),
        PreserveTier::Semver => previous
            .iter()
            .filter(|(uuid, _)| direct.contains(uuid))
            .map(|(uuid, v)| {
                let caret = parse_range(&format!("^{v}")).unwrap_or_else(|_| VersionRange::exact(v.clone()));
                (*uuid, caret)
            })
            .collect(),
        PreserveTier::None => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_tier_pins_every_previous_package() {
        let uuid = Uuid::from_u128(1);
        let previous = BTreeMap::from([(uuid, Version::new(1, 2, 3))]);
        let direct = std::collections::BTreeSet::new();
        let constraints = tier_constraints(PreserveTier::All, &previous, &direct);
        assert!(constraints[&uuid].contains(&Version::new(1, 2, 3)));
        assert!(!constraints[&uuid].contains(&Version::new(1, 2, 4)));
    }

    #[test]
    fn semver_tier_allows_movement_within_caret_window() {
        let uuid = Uuid::from_u128(1);
        let previous = BTreeMap::from([(uuid, Version::new(1, 2, 3))]);
        let direct = std::collections::BTreeSet::from([uuid]);
        let constraints = tier_constraints(PreserveTier::Semver, &previous, &direct);
        assert!(constraints[&uuid].contains(&Version::new(1, 9, 0)));
        assert!(!constraints[&uuid].contains(&Version::new(2, 0, 0)));
    }

    #[test]
    fn none_tier_has_no_hard_constraints() {
        let previous = BTreeMap::from([(Uuid::from_u128(1), Version::new(1, 2, 3))]);
        let direct = std::collections::BTreeSet::new();
        assert!(tier_constraints(PreserveTier::None, &previous, &direct).is_empty());
    }
}
