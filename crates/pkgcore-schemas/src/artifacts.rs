//! The artifact binding file: named binary artifacts, optionally tagged
//! with platform predicates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `name -> single entry | [entries]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ArtifactsToml(pub BTreeMap<String, ArtifactBindingValue>);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ArtifactBindingValue {
    Single(ArtifactEntry),
    Many(Vec<ArtifactEntry>),
}

impl ArtifactBindingValue {
    pub fn entries(&self) -> &[ArtifactEntry] {
        match self {
            ArtifactBindingValue::Single(e) => std::slice::from_ref(e),
            ArtifactBindingValue::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactEntry {
    #[serde(rename = "git-tree-sha1")]
    pub git_tree_sha1: String,
    #[serde(default)]
    pub download: Vec<DownloadSpec>,
    #[serde(default)]
    pub lazy: bool,
    pub os: Option<String>,
    pub arch: Option<String>,
    pub libc: Option<String>,
    /// Extensible platform-predicate keys (e.g. `cuda`) beyond the fixed
    /// `os`/`arch`/`libc` triad.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadSpec {
    pub url: String,
    pub sha256: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_single_and_tagged_list_forms() {
        let toml_src = r#"
            [MyLib]
            git-tree-sha1 = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"

            [[OtherLib]]
            os = "linux"
            arch = "x86_64"
            git-tree-sha1 = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"

            [[OtherLib]]
            os = "macos"
            git-tree-sha1 = "cccccccccccccccccccccccccccccccccccccccc"
        "#;
        let parsed: ArtifactsToml = toml::from_str(toml_src).unwrap();
        assert_eq!(parsed.0["MyLib"].entries().len(), 1);
        assert_eq!(parsed.0["OtherLib"].entries().len(), 2);
    }
}
