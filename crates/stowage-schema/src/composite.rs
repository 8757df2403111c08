use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

/// The minimal `package.json` written next to a bundled artifact.
///
/// Field order on disk follows declaration order: `name`, `version`,
/// `description`, `private`, `scripts`, `dependencies`, then any copied
/// package-manager sections.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompositeManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub private: bool,
    pub scripts: Map<String, Value>,
    pub dependencies: BTreeMap<String, String>,
    #[serde(flatten)]
    pub sections: Map<String, Value>,
}

impl CompositeManifest {
    pub fn new(service: &str, version: &str) -> Self {
        Self {
            name: service.to_owned(),
            version: version.to_owned(),
            description: format!("Packaged externals for {service}"),
            private: true,
            scripts: Map::new(),
            dependencies: BTreeMap::new(),
            sections: Map::new(),
        }
    }

    /// Two-space indented JSON without a trailing newline.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// blake3 hex digest of the serialized manifest.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        Ok(blake3::hash(self.to_json()?.as_bytes()).to_hex().to_string())
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = self.to_json().map_err(std::io::Error::other)?;
        write_atomic(path, content.as_bytes())
    }
}

/// Write `content` to `path` through a temp file in the same directory, so a
/// reader never observes a partially written file.
pub fn write_atomic(path: impl AsRef<Path>, content: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    if let Ok(f) = fs::File::open(dir) {
        let _ = f.sync_all();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CompositeManifest {
        let mut manifest = CompositeManifest::new("billing", "1.4.0");
        manifest.dependencies.insert("uuid".into(), "^9.0.0".into());
        manifest.dependencies.insert("axios".into(), "1.6.0".into());
        manifest.scripts.insert("script0".into(), Value::from("echo hi"));
        manifest
            .sections
            .insert("resolutions".into(), serde_json::json!({ "ms": "2.1.3" }));
        manifest
    }

    #[test]
    fn keys_follow_fixed_order() {
        let json = sample().to_json().unwrap();
        let keys: Vec<String> = serde_json::from_str::<Map<String, Value>>(&json)
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(
            keys,
            vec![
                "name",
                "version",
                "description",
                "private",
                "scripts",
                "dependencies",
                "resolutions"
            ]
        );
    }

    #[test]
    fn json_has_two_space_indent_and_no_trailing_newline() {
        let json = CompositeManifest::new("svc", "1.0.0").to_json().unwrap();
        assert!(json.starts_with("{\n  \"name\": \"svc\""));
        assert!(!json.ends_with('\n'));
        assert!(json.contains("\"description\": \"Packaged externals for svc\""));
        assert!(json.contains("\"private\": true"));
    }

    #[test]
    fn dependencies_are_sorted() {
        let json = sample().to_json().unwrap();
        let axios = json.find("\"axios\"").unwrap();
        let uuid = json.find("\"uuid\"").unwrap();
        assert!(axios < uuid);
    }

    #[test]
    fn digest_is_stable() {
        assert_eq!(sample().digest().unwrap(), sample().digest().unwrap());
        assert_ne!(
            sample().digest().unwrap(),
            CompositeManifest::new("billing", "1.4.0").digest().unwrap()
        );
    }

    #[test]
    fn write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("package.json");
        fs::write(&path, "old").unwrap();
        sample().write_to_file(&path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, sample().to_json().unwrap());
    }
}
