use crate::PackagerError;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use stowage_schema::{DependencyGraph, PackagerOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LockfileFormat {
    Json,
    Text,
}

/// Static facts about a backend. Never computed at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackagerCapabilities {
    pub lockfile_name: &'static str,
    pub lockfile_format: LockfileFormat,
    /// Top-level project manifest sections copied verbatim into the composite manifest.
    pub copy_package_sections: &'static [&'static str],
    /// Install happens in a staging directory and the modules must be copied
    /// into the artifact afterwards.
    pub must_copy_modules: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LockfileContents {
    Json(Value),
    Text(String),
}

impl LockfileContents {
    pub fn read(path: &Path, format: LockfileFormat) -> Result<Self, PackagerError> {
        let content = fs::read_to_string(path)?;
        Ok(match format {
            LockfileFormat::Json => Self::Json(serde_json::from_str(&content)?),
            LockfileFormat::Text => Self::Text(content),
        })
    }

    /// JSON is rendered with two-space indentation and no trailing newline;
    /// text is written back as-is.
    pub fn render(&self) -> Result<String, PackagerError> {
        Ok(match self {
            Self::Json(value) => serde_json::to_string_pretty(value)?,
            Self::Text(text) => text.clone(),
        })
    }
}

pub trait PackagerBackend: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> PackagerCapabilities;

    /// Whether the manager executable can be found.
    fn available(&self) -> bool;

    fn version(&self) -> Result<String, PackagerError>;

    /// Production dependency graph of the project at `root`, `depth` levels deep.
    /// Backends may answer from an existing lockfile without invoking the manager.
    fn prod_dependencies(
        &self,
        root: &Path,
        depth: usize,
        options: &PackagerOptions,
    ) -> Result<DependencyGraph, PackagerError>;

    /// Prefix every relative `file:` reference in `contents` with `path_to_root`.
    /// Applying this twice prefixes twice; callers rebase once per relocation.
    fn rebase_lockfile(
        &self,
        path_to_root: &str,
        contents: LockfileContents,
    ) -> Result<LockfileContents, PackagerError>;

    fn install(&self, cwd: &Path, options: &PackagerOptions) -> Result<(), PackagerError>;

    fn prune(&self, cwd: &Path, options: &PackagerOptions) -> Result<(), PackagerError>;

    /// Run the named manifest scripts one after another.
    fn run_scripts(&self, cwd: &Path, names: &[String]) -> Result<(), PackagerError>;
}

const KNOWN_PACKAGERS: &[&str] = &["npm", "yarn", "mock"];

pub fn known_packagers() -> &'static [&'static str] {
    KNOWN_PACKAGERS
}

pub fn select_packager(name: &str) -> Result<Box<dyn PackagerBackend>, PackagerError> {
    match name {
        "npm" => Ok(Box::new(crate::npm::NpmPackager::new())),
        "yarn" => Ok(Box::new(crate::yarn::YarnPackager::new())),
        "mock" => Ok(Box::new(crate::mock::MockPackager::new())),
        other => Err(PackagerError::UnknownPackager(other.to_owned())),
    }
}
