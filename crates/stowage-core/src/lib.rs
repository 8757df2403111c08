//! Core packaging engine for Stowage.
//!
//! This crate ties together the project manifest, the dependency graph, and a
//! package-manager backend into the `Engine`: for every bundled artifact it
//! resolves external modules to installable specs, validates them against
//! development-only dependencies, writes the composite manifest and rebased
//! lockfile, then installs, prunes, runs scripts and copies modules on a bounded
//! worker pool with fail-fast cancellation.

pub mod assembler;
pub mod concurrency;
pub mod copy;
pub mod engine;
pub mod lifecycle;
pub mod lookup;
pub mod resolver;
pub mod validator;

pub use assembler::{relative_path, ManifestAssembler, WrittenManifest};
pub use concurrency::{install_signal_handler, shutdown_requested, CancelToken};
pub use copy::{copy_recursive, move_modules};
pub use engine::{ArtifactReport, Engine, ProjectContext, RunReport};
pub use lifecycle::{validate_transition, ArtifactState};
pub use lookup::{InMemoryLookup, ManifestLookup, NodeModulesLookup};
pub use resolver::{Resolution, Resolver, UnresolvedModule};
pub use validator::{is_runtime_provided, Validator, Verdict};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] stowage_schema::ManifestError),
    #[error("config error: {0}")]
    Config(#[from] stowage_schema::ConfigError),
    #[error("packager error: {0}")]
    Packager(#[from] stowage_packager::PackagerError),
    #[error("serious packaging error: '{package}' is required at runtime but only declared in devDependencies; move it to dependencies or add it to include_modules.force_exclude")]
    DevDependencyAtRuntime { package: String },
    #[error("artifact {}: {source}", .artifact.display())]
    Artifact {
        artifact: PathBuf,
        #[source]
        source: Box<CoreError>,
    },
    #[error("{failed} of {total} artifacts failed; first failure: {first}")]
    RunFailed {
        failed: usize,
        total: usize,
        first: String,
    },
    #[error("{cancelled} of {total} artifacts were cancelled before completion")]
    RunCancelled { cancelled: usize, total: usize },
    #[error("packaging cancelled")]
    Cancelled,
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn for_artifact(self, artifact: impl Into<PathBuf>) -> Self {
        Self::Artifact {
            artifact: artifact.into(),
            source: Box::new(self),
        }
    }
}
