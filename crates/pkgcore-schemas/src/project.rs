//! The human-edited declarative project file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use semver::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level schema of the declarative project file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProjectToml {
    pub name: Option<String>,
    pub uuid: Option<Uuid>,
    pub version: Option<Version>,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub deps: BTreeMap<String, Uuid>,
    #[serde(default)]
    pub weakdeps: BTreeMap<String, Uuid>,
    #[serde(default)]
    pub extras: BTreeMap<String, Uuid>,
    /// Raw compat range strings, keyed by dependency name. May also
    /// contain an entry for the host language itself.
    #[serde(default)]
    pub compat: BTreeMap<String, String>,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceSpec>,
    #[serde(default)]
    pub extensions: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub targets: BTreeMap<String, Vec<String>>,
    pub workspace: Option<WorkspaceTable>,
}

/// An author entry: either a bare `"Name <email>"` string or a table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Author {
    Inline(String),
    Table {
        name: String,
        email: Option<String>,
        orcid: Option<String>,
        github: Option<String>,
    },
}

/// Where an unregistered (or overridden) dependency's source tree comes
/// from: a VCS url+rev, or a local path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SourceSpec {
    Url {
        url: String,
        rev: Option<String>,
        subdir: Option<String>,
    },
    Path {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceTable {
    #[serde(default)]
    pub projects: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_minimal_project() {
        let toml_src = r#"
            name = "Example"
            uuid = "7876af07-990d-54b4-ab0e-23690620f79a"

            [deps]
            Other = "00000000-0000-0000-0000-000000000001"
        "#;
        let parsed: ProjectToml = toml::from_str(toml_src).unwrap();
        assert_eq!(parsed.name.as_deref(), Some("Example"));
        assert_eq!(parsed.deps.len(), 1);
        let reserialized = toml::to_string(&parsed).unwrap();
        let reparsed: ProjectToml = toml::from_str(&reserialized).unwrap();
        assert_eq!(parsed, reparsed);
    }

    #[test]
    fn author_accepts_inline_and_table_forms() {
        let toml_src = r#"
            authors = ["Jane Doe <jane@example.com>", { name = "J. Roe", github = "jroe" }]
        "#;
        let parsed: ProjectToml = toml::from_str(toml_src).unwrap();
        assert_eq!(parsed.authors.len(), 2);
    }
}
