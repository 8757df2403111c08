use std::collections::HashMap;
use std::path::{Path, PathBuf};
use stowage_schema::{parse_manifest_file, ManifestError, ProjectManifest};

/// Reads the manifest of an installed package, used to discover its peer
/// dependencies during resolution.
pub trait ManifestLookup: Send + Sync {
    fn package_manifest(&self, name: &str) -> Result<ProjectManifest, ManifestError>;
}

/// Looks packages up under a `node_modules` directory.
#[derive(Debug, Clone)]
pub struct NodeModulesLookup {
    base: PathBuf,
}

impl NodeModulesLookup {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `<project>/<relative_dir>/node_modules` when configured and present,
    /// otherwise `<project>/node_modules`. Monorepos hoist installs into a
    /// parent directory.
    pub fn for_project(project_dir: &Path, node_modules_relative_dir: Option<&str>) -> Self {
        if let Some(relative) = node_modules_relative_dir {
            let hoisted = project_dir.join(relative).join("node_modules");
            if hoisted.is_dir() {
                return Self::new(hoisted);
            }
        }
        Self::new(project_dir.join("node_modules"))
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl ManifestLookup for NodeModulesLookup {
    fn package_manifest(&self, name: &str) -> Result<ProjectManifest, ManifestError> {
        parse_manifest_file(self.base.join(name).join("package.json"))
    }
}

/// Fixed set of package manifests, keyed by package name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLookup {
    manifests: HashMap<String, ProjectManifest>,
}

impl InMemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, manifest: ProjectManifest) -> Self {
        self.manifests.insert(name.into(), manifest);
        self
    }
}

impl ManifestLookup for InMemoryLookup {
    fn package_manifest(&self, name: &str) -> Result<ProjectManifest, ManifestError> {
        self.manifests.get(name).cloned().ok_or_else(|| {
            ManifestError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no manifest for '{name}'"),
            ))
        })
    }
}
