use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("concurrency must be at least 1")]
    InvalidConcurrency,
    #[error("include_modules.dependency_depth must be at least 1")]
    InvalidDependencyDepth,
    #[error("service name must not be empty")]
    EmptyService,
}

/// `stowage.toml`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StowageConfig {
    /// Defaults to the project manifest name.
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default = "default_packager")]
    pub packager: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// The deploy target installs dependencies itself; packaged modules are
    /// never copied into the artifact.
    #[serde(default)]
    pub out_of_band_dependencies: bool,
    #[serde(default)]
    pub include_modules: IncludeModules,
    #[serde(default)]
    pub packager_options: PackagerOptions,
}

impl Default for StowageConfig {
    fn default() -> Self {
        Self {
            service: None,
            packager: default_packager(),
            concurrency: default_concurrency(),
            out_of_band_dependencies: false,
            include_modules: IncludeModules::default(),
            packager_options: PackagerOptions::default(),
        }
    }
}

fn default_packager() -> String {
    "npm".to_owned()
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .min(4)
}

/// `include_modules = true|false` or a table of overrides.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum IncludeModules {
    Enabled(bool),
    Detailed(IncludeModulesTable),
}

impl Default for IncludeModules {
    fn default() -> Self {
        Self::Enabled(false)
    }
}

impl IncludeModules {
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Enabled(enabled) => *enabled,
            Self::Detailed(_) => true,
        }
    }

    /// Effective settings; the boolean form uses the table defaults.
    pub fn settings(&self) -> IncludeModulesTable {
        match self {
            Self::Enabled(_) => IncludeModulesTable::default(),
            Self::Detailed(table) => table.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IncludeModulesTable {
    #[serde(default)]
    pub force_include: Vec<String>,
    #[serde(default)]
    pub force_exclude: Vec<String>,
    #[serde(default = "default_package_path")]
    pub package_path: String,
    #[serde(default)]
    pub node_modules_relative_dir: Option<String>,
    #[serde(default = "default_dependency_depth")]
    pub dependency_depth: usize,
}

impl Default for IncludeModulesTable {
    fn default() -> Self {
        Self {
            force_include: Vec::new(),
            force_exclude: Vec::new(),
            package_path: default_package_path(),
            node_modules_relative_dir: None,
            dependency_depth: default_dependency_depth(),
        }
    }
}

fn default_package_path() -> String {
    "./package.json".to_owned()
}

fn default_dependency_depth() -> usize {
    1
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackagerOptions {
    /// Shell commands run after prune, exposed as `script0..scriptN`.
    #[serde(default)]
    pub scripts: Vec<String>,
    #[serde(default)]
    pub ignore_scripts: bool,
    #[serde(default)]
    pub no_install: bool,
    #[serde(default)]
    pub network_concurrency: Option<u32>,
}

pub fn parse_config_str(input: &str) -> Result<StowageConfig, ConfigError> {
    let config: StowageConfig = toml::from_str(input)?;
    if config.concurrency == 0 {
        return Err(ConfigError::InvalidConcurrency);
    }
    if config.include_modules.settings().dependency_depth == 0 {
        return Err(ConfigError::InvalidDependencyDepth);
    }
    if config.service.as_deref().is_some_and(|s| s.trim().is_empty()) {
        return Err(ConfigError::EmptyService);
    }
    Ok(config)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<StowageConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}
