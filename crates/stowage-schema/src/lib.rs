//! Data model for Stowage: the project manifest, the normalized dependency graph,
//! resolved dependency sets, and the composite manifest written next to each artifact.
//!
//! This crate defines the schema layer: `package.json` parsing (`ProjectManifest`),
//! the arena-backed `DependencyGraph` built from package-manager listings or
//! lockfiles, external module references reported by the bundler
//! (`ExternalModuleRef`, `ArtifactInput`), the configuration file
//! (`StowageConfig`), and the `CompositeManifest` the assembler writes to disk.

pub mod artifact;
pub mod builtins;
pub mod composite;
pub mod config;
pub mod graph;
pub mod manifest;
pub mod rebase;
pub mod resolved;

pub use artifact::{parse_artifacts_file, parse_artifacts_str, ArtifactInput, ArtifactListError};
pub use builtins::is_builtin_module;
pub use composite::{write_atomic, CompositeManifest};
pub use config::{
    parse_config_file, parse_config_str, ConfigError, IncludeModules, IncludeModulesTable,
    PackagerOptions, StowageConfig,
};
pub use graph::{DependencyGraph, DependencyTree, GraphNode, NodeId, TreeEntry};
pub use manifest::{parse_manifest_file, parse_manifest_str, ManifestError, ProjectManifest};
pub use rebase::{rebase_dependency_spec, rebase_file_protocol};
pub use resolved::{package_name, ExternalModuleRef, ResolvedDependencySet};
