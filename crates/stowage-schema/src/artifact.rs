use crate::resolved::ExternalModuleRef;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactListError {
    #[error("failed to read artifact list: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse artifact list: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("artifact {index} has an empty outputPath")]
    EmptyOutputPath { index: usize },
    #[error("outputPath '{0}' is listed more than once")]
    DuplicateOutputPath(String),
}

/// One compiled artifact as reported by the bundler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInput {
    pub output_path: PathBuf,
    #[serde(default)]
    pub external_modules: Vec<ExternalModuleRef>,
}

impl ArtifactInput {
    pub fn new(output_path: impl Into<PathBuf>, external_modules: Vec<ExternalModuleRef>) -> Self {
        Self {
            output_path: output_path.into(),
            external_modules,
        }
    }
}

/// Parse `[{ "outputPath": ..., "externalModules": [{ "name", "origin" }] }]`.
pub fn parse_artifacts_str(input: &str) -> Result<Vec<ArtifactInput>, ArtifactListError> {
    let artifacts: Vec<ArtifactInput> = serde_json::from_str(input)?;
    let mut seen = std::collections::HashSet::new();
    for (index, artifact) in artifacts.iter().enumerate() {
        if artifact.output_path.as_os_str().is_empty() {
            return Err(ArtifactListError::EmptyOutputPath { index });
        }
        if !seen.insert(&artifact.output_path) {
            return Err(ArtifactListError::DuplicateOutputPath(
                artifact.output_path.display().to_string(),
            ));
        }
    }
    Ok(artifacts)
}

pub fn parse_artifacts_file(path: impl AsRef<Path>) -> Result<Vec<ArtifactInput>, ArtifactListError> {
    let content = fs::read_to_string(path)?;
    parse_artifacts_str(&content)
}
