//! Cross-registry trust enforcement and resolver backend selection.

use std::collections::HashSet;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Which constraint-solving strategy the resolver should use; selectable
/// at runtime per Design Notes §9 ("Dynamic dispatch across resolver
/// strategies").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverBackend {
    Sat,
    MaxSum,
}

/// Checks whether `candidate` may join `incumbents` as a source for
/// `uuid`, per §3's mutual-trust rule: two registries may co-serve a
/// package only if each lists the other by UUID in that package's trust
/// set.
///
/// Returns `Ok(())` when trusted, or when `allow_registry_extension` is
/// set (the override is recorded by the caller, not here). Otherwise
/// returns `TrustViolation`, which callers may downgrade to a warning
/// (the default) per §4.9.
pub fn check_trust(
    uuid: Uuid,
    candidate_registry: Uuid,
    candidate_trusted: &HashSet<Uuid>,
    incumbent_registry: Uuid,
    incumbent_trusted: &HashSet<Uuid>,
    allow_registry_extension: bool,
) -> Result<()> {
    if candidate_registry == incumbent_registry {
        return Ok(());
    }
    let mutual = candidate_trusted.contains(&incumbent_registry)
        && incumbent_trusted.contains(&candidate_registry);
    if mutual || allow_registry_extension {
        return Ok(());
    }
    Err(Error::TrustViolation {
        uuid,
        registries: vec![incumbent_registry, candidate_registry],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutual_trust_is_required_both_ways() {
        let uuid = Uuid::nil();
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let a_trusts_b: HashSet<Uuid> = [b].into_iter().collect();
        let b_trusts_nobody: HashSet<Uuid> = HashSet::new();
        let result = check_trust(uuid, b, &b_trusts_nobody, a, &a_trusts_b, false);
        assert!(result.is_err());
    }

    #[test]
    fn override_accepts_an_untrusted_extension() {
        let uuid = Uuid::nil();
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let empty = HashSet::new();
        let result = check_trust(uuid, b, &empty, a, &empty, true);
        assert!(result.is_ok());
    }
}
