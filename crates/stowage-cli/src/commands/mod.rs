pub mod doctor;
pub mod graph;
pub mod package;
pub mod resolve;

use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use stowage_core::{ArtifactState, Engine, ProjectContext};
use stowage_packager::select_packager;
use stowage_schema::{parse_artifacts_file, parse_config_file, ArtifactInput, StowageConfig};
use tracing::debug;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_RUN_FAILED: u8 = 3;

pub const CONFIG_FILE: &str = "stowage.toml";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_state(state: ArtifactState) -> String {
    use console::Style;
    let text = state.to_string();
    match state {
        ArtifactState::Done => Style::new().green().apply_to(text).to_string(),
        ArtifactState::Failed => Style::new().red().bold().apply_to(text).to_string(),
        ArtifactState::Cancelled => Style::new().yellow().apply_to(text).to_string(),
        _ => text,
    }
}

/// The explicit config file, else `<project_dir>/stowage.toml` when present,
/// else defaults (packaging disabled).
pub fn load_config(project_dir: &Path, config: Option<&Path>) -> Result<StowageConfig, String> {
    let path = match config {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let candidate = project_dir.join(CONFIG_FILE);
            candidate.is_file().then_some(candidate)
        }
    };
    match path {
        Some(path) => {
            debug!("reading config from {}", path.display());
            parse_config_file(&path).map_err(|e| format!("config error: {}: {e}", path.display()))
        }
        None => {
            debug!("no {CONFIG_FILE} found, using defaults");
            Ok(StowageConfig::default())
        }
    }
}

pub fn make_engine(project_dir: &Path, config: Option<&Path>) -> Result<Engine, String> {
    let config = load_config(project_dir, config)?;
    let backend = select_packager(&config.packager).map_err(|e| format!("packager error: {e}"))?;
    let context = ProjectContext::load(project_dir, config).map_err(|e| e.to_string())?;
    Ok(Engine::new(context, Arc::from(backend)))
}

/// Artifact list with relative output paths anchored at `project_dir`.
pub fn load_artifacts(project_dir: &Path, path: &Path) -> Result<Vec<ArtifactInput>, String> {
    let mut artifacts =
        parse_artifacts_file(path).map_err(|e| format!("artifact list error: {e}"))?;
    for artifact in &mut artifacts {
        if artifact.output_path.is_relative() {
            artifact.output_path = project_dir.join(&artifact.output_path);
        }
    }
    Ok(artifacts)
}

pub fn display_path(path: &Path, project_dir: &Path) -> PathBuf {
    path.strip_prefix(project_dir)
        .map_or_else(|_| path.to_path_buf(), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn colorize_state_keeps_text() {
        for state in [ArtifactState::Done, ArtifactState::Failed, ArtifactState::Cancelled, ArtifactState::Idle] {
            assert!(colorize_state(state).contains(&state.to_string()));
        }
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_CONFIG_ERROR);
        assert_ne!(EXIT_CONFIG_ERROR, EXIT_RUN_FAILED);
    }

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path(), None).unwrap();
        assert!(!config.include_modules.is_enabled());
        assert_eq!(config.packager, "npm");
    }

    #[test]
    fn project_config_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "packager = \"yarn\"").unwrap();
        assert_eq!(load_config(dir.path(), None).unwrap().packager, "yarn");
    }

    #[test]
    fn explicit_missing_config_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path(), Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.starts_with("config error:"));
    }

    #[test]
    fn unknown_packager_is_reported_before_io() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "packager = \"pnpm\"").unwrap();
        let err = make_engine(dir.path(), None).err().unwrap();
        assert!(err.starts_with("packager error: unknown packager"), "{err}");
    }

    #[test]
    fn relative_output_paths_are_anchored() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("artifacts.json");
        fs::write(
            &list,
            r#"[{"outputPath":".build/fn","externalModules":[{"name":"uuid"}]}]"#,
        )
        .unwrap();
        let artifacts = load_artifacts(dir.path(), &list).unwrap();
        assert_eq!(artifacts[0].output_path, dir.path().join(".build/fn"));
    }

    #[test]
    fn spinner_creates_progress_bar() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
