//! Package-manager backends for Stowage.
//!
//! This crate implements the execution layer: the `PackagerBackend` trait with
//! npm and yarn (classic) implementations plus an in-process mock, the backend
//! registry, blocking process spawning with captured output, and the
//! prefix table that classifies manager stderr into fatal and benign lines.

pub mod backend;
pub mod classify;
pub mod mock;
pub mod npm;
pub mod process;
pub mod yarn;

pub use backend::{
    known_packagers, select_packager, LockfileContents, LockfileFormat, PackagerBackend,
    PackagerCapabilities,
};
pub use classify::{classify_stderr, LinePolicy, StderrRule, StderrVerdict};
pub use mock::{MockCall, MockPackager, MockStep};
pub use npm::NpmPackager;
pub use process::{run_process, spawn_process, ProcessOutput, SpawnError};
pub use stowage_schema::PackagerOptions;
pub use yarn::YarnPackager;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackagerError {
    #[error("unknown packager '{0}' (expected one of: npm, yarn, mock)")]
    UnknownPackager(String),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("{command} failed: {}\nstdout:\n{stdout}\nstderr:\n{stderr}", .lines.join("; "))]
    Fatal {
        command: String,
        stdout: String,
        stderr: String,
        lines: Vec<String>,
    },
    #[error("unexpected output from {command}: {reason}")]
    InvalidOutput { command: String, reason: String },
    #[error("packager I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("packager JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
