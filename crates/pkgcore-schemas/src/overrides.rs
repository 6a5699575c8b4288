//! The depot-root `artifacts/Overrides.toml` file: flat content-hash
//! redirects, plus per-package artifact-name redirects under `[UUID]`
//! tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct OverridesToml {
    /// Top-level `hash = "path-or-hash-or-empty"` entries.
    #[serde(flatten)]
    pub hashes: BTreeMap<String, OverrideEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OverrideEntry {
    /// Absolute path, replacement hash, or `""` to remove the override.
    Redirect(String),
    /// A `[UUID]` table mapping artifact name to redirect value.
    PerPackage(BTreeMap<Uuid, BTreeMap<String, String>>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_and_per_package_forms_coexist() {
        let toml_src = r#"
            aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa = "/opt/lib"
            bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb = ""
        "#;
        let parsed: OverridesToml = toml::from_str(toml_src).unwrap();
        assert_eq!(parsed.hashes.len(), 2);
    }
}
