use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read project manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse project manifest: {0}")]
    ParseJson(#[from] serde_json::Error),
}

/// Metadata for an optional peer dependency (`peerDependenciesMeta.<name>`).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PeerDependencyMeta {
    #[serde(default)]
    pub optional: bool,
}

/// The subset of a `package.json` that packaging cares about.
///
/// Every other top-level field is kept in `extra` so backend-specific sections
/// (for example yarn's `resolutions`) can be copied verbatim.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub peer_dependencies_meta: BTreeMap<String, PeerDependencyMeta>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectManifest {
    pub fn dependency(&self, name: &str) -> Option<&str> {
        self.dependencies.get(name).map(String::as_str)
    }

    pub fn is_dev_dependency(&self, name: &str) -> bool {
        self.dev_dependencies.contains_key(name)
    }

    /// Peer dependencies that must be installed alongside this package,
    /// i.e. all peers not flagged optional in `peerDependenciesMeta`.
    pub fn required_peers(&self) -> impl Iterator<Item = &str> {
        self.peer_dependencies.keys().map(String::as_str).filter(|name| {
            !self
                .peer_dependencies_meta
                .get(*name)
                .is_some_and(|meta| meta.optional)
        })
    }

    /// A top-level section that is not modelled explicitly.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}

pub fn parse_manifest_str(input: &str) -> Result<ProjectManifest, ManifestError> {
    Ok(serde_json::from_str(input)?)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<ProjectManifest, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_manifest() {
        let input = r#"{
  "name": "my-service",
  "version": "2.1.0",
  "dependencies": { "lodash": "^4.17.21", "local-lib": "file:../local-lib" },
  "devDependencies": { "eslint": "^8.0.0" },
  "resolutions": { "minimist": "1.2.8" },
  "scripts": { "build": "webpack" }
}"#;
        let manifest = parse_manifest_str(input).expect("should parse");
        assert_eq!(manifest.name.as_deref(), Some("my-service"));
        assert_eq!(manifest.dependency("lodash"), Some("^4.17.21"));
        assert!(manifest.is_dev_dependency("eslint"));
        assert!(!manifest.is_dev_dependency("lodash"));
        assert_eq!(manifest.section("resolutions").unwrap()["minimist"], "1.2.8");
        assert!(manifest.section("scripts").is_some());
    }

    #[test]
    fn parses_empty_manifest() {
        let manifest = parse_manifest_str("{}").expect("should parse");
        assert!(manifest.name.is_none());
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.dev_dependencies.is_empty());
    }

    #[test]
    fn optional_peers_are_not_required() {
        let input = r#"{
  "peerDependencies": { "react": "*", "react-dom": "*", "typescript": ">=4" },
  "peerDependenciesMeta": { "typescript": { "optional": true } }
}"#;
        let manifest = parse_manifest_str(input).unwrap();
        let peers: Vec<&str> = manifest.required_peers().collect();
        assert_eq!(peers, vec!["react", "react-dom"]);
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(parse_manifest_str("{ \"name\": ").is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_manifest_file(dir.path().join("package.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Io(_)));
    }
}
