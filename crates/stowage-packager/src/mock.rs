use crate::backend::{LockfileContents, LockfileFormat, PackagerBackend, PackagerCapabilities};
use crate::process::SpawnError;
use crate::PackagerError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use stowage_schema::{parse_manifest_file, DependencyGraph, PackagerOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ProdDependencies { root: PathBuf, depth: usize },
    Install { cwd: PathBuf },
    Prune { cwd: PathBuf },
    RunScripts { cwd: PathBuf, names: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockStep {
    ProdDependencies,
    Install,
    Prune,
    RunScripts,
}

impl fmt::Display for MockStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ProdDependencies => "prod-dependencies",
            Self::Install => "install",
            Self::Prune => "prune",
            Self::RunScripts => "run-scripts",
        };
        f.write_str(s)
    }
}

/// In-process backend that never spawns anything.
///
/// Without an explicit graph, the project's own `package.json` dependencies
/// become the graph roots. `install` materializes one
/// `node_modules/<name>/package.json` per manifest dependency in `cwd`.
pub struct MockPackager {
    graph: Option<DependencyGraph>,
    fail_on: Option<MockStep>,
    fail_in: Option<PathBuf>,
    must_copy_modules: bool,
    calls: Mutex<Vec<MockCall>>,
}

impl Default for MockPackager {
    fn default() -> Self {
        Self {
            graph: None,
            fail_on: None,
            fail_in: None,
            must_copy_modules: true,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockPackager {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_graph(mut self, graph: DependencyGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Fail `step` in every directory.
    #[must_use]
    pub fn failing_on(mut self, step: MockStep) -> Self {
        self.fail_on = Some(step);
        self
    }

    /// Fail `step` only when it runs inside `dir` (or below it).
    #[must_use]
    pub fn failing_in(mut self, step: MockStep, dir: impl Into<PathBuf>) -> Self {
        self.fail_on = Some(step);
        self.fail_in = Some(dir.into());
        self
    }

    #[must_use]
    pub fn copying_modules(mut self, must_copy_modules: bool) -> Self {
        self.must_copy_modules = must_copy_modules;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: MockCall) -> Result<(), PackagerError> {
        let mut calls = self.calls.lock().map_err(|e| SpawnError {
            message: format!("mutex poisoned: {e}"),
            stdout: String::new(),
            stderr: String::new(),
        })?;
        calls.push(call);
        Ok(())
    }

    fn check_failure(&self, step: MockStep, dir: &Path) -> Result<(), PackagerError> {
        if self.fail_on != Some(step) {
            return Ok(());
        }
        if let Some(only) = &self.fail_in {
            if !dir.starts_with(only) {
                return Ok(());
            }
        }
        Err(PackagerError::Spawn(SpawnError {
            message: format!("mock {step} failed in {}", dir.display()),
            stdout: String::new(),
            stderr: format!("mock: {step} configured to fail"),
        }))
    }

    fn graph_from_manifest(root: &Path) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        if let Ok(manifest) = parse_manifest_file(root.join("package.json")) {
            for (name, spec) in &manifest.dependencies {
                let id = graph.add_node(name.as_str(), spec.as_str());
                graph.add_root(id);
            }
        }
        graph
    }
}

impl PackagerBackend for MockPackager {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn capabilities(&self) -> PackagerCapabilities {
        PackagerCapabilities {
            lockfile_name: "mock-lock.json",
            lockfile_format: LockfileFormat::Json,
            copy_package_sections: &[],
            must_copy_modules: self.must_copy_modules,
        }
    }

    fn available(&self) -> bool {
        true
    }

    fn version(&self) -> Result<String, PackagerError> {
        Ok("0.0.0-mock".to_owned())
    }

    fn prod_dependencies(
        &self,
        root: &Path,
        depth: usize,
        _options: &PackagerOptions,
    ) -> Result<DependencyGraph, PackagerError> {
        self.record(MockCall::ProdDependencies {
            root: root.to_path_buf(),
            depth,
        })?;
        self.check_failure(MockStep::ProdDependencies, root)?;
        Ok(self
            .graph
            .clone()
            .unwrap_or_else(|| Self::graph_from_manifest(root)))
    }

    fn rebase_lockfile(
        &self,
        _path_to_root: &str,
        contents: LockfileContents,
    ) -> Result<LockfileContents, PackagerError> {
        Ok(contents)
    }

    fn install(&self, cwd: &Path, _options: &PackagerOptions) -> Result<(), PackagerError> {
        self.record(MockCall::Install {
            cwd: cwd.to_path_buf(),
        })?;
        self.check_failure(MockStep::Install, cwd)?;

        let manifest = parse_manifest_file(cwd.join("package.json")).map_err(|e| SpawnError {
            message: format!("mock install found no manifest in {}", cwd.display()),
            stdout: String::new(),
            stderr: e.to_string(),
        })?;
        for (name, spec) in &manifest.dependencies {
            let dir = cwd.join("node_modules").join(name);
            fs::create_dir_all(&dir)?;
            let installed = serde_json::json!({ "name": name, "version": spec });
            fs::write(dir.join("package.json"), serde_json::to_string_pretty(&installed)?)?;
        }
        Ok(())
    }

    fn prune(&self, cwd: &Path, _options: &PackagerOptions) -> Result<(), PackagerError> {
        self.record(MockCall::Prune {
            cwd: cwd.to_path_buf(),
        })?;
        self.check_failure(MockStep::Prune, cwd)
    }

    fn run_scripts(&self, cwd: &Path, names: &[String]) -> Result<(), PackagerError> {
        self.record(MockCall::RunScripts {
            cwd: cwd.to_path_buf(),
            names: names.to_vec(),
        })?;
        self.check_failure(MockStep::RunScripts, cwd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_records_calls_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"dependencies":{}}"#).unwrap();
        let mock = MockPackager::new();
        let options = PackagerOptions::default();
        mock.install(dir.path(), &options).unwrap();
        mock.prune(dir.path(), &options).unwrap();
        mock.run_scripts(dir.path(), &["script0".to_owned()]).unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], MockCall::Install { .. }));
        assert!(matches!(calls[1], MockCall::Prune { .. }));
        assert!(matches!(&calls[2], MockCall::RunScripts { names, .. } if names == &["script0"]));
    }

    #[test]
    fn mock_install_materializes_modules() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies":{"uuid":"9.0.1","@scope/pkg":"1.2.3"}}"#,
        )
        .unwrap();
        MockPackager::new()
            .install(dir.path(), &PackagerOptions::default())
            .unwrap();
        assert!(dir.path().join("node_modules/uuid/package.json").is_file());
        assert!(dir
            .path()
            .join("node_modules/@scope/pkg/package.json")
            .is_file());
    }

    #[test]
    fn mock_graph_defaults_to_manifest_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies":{"uuid":"^9.0.0"}}"#,
        )
        .unwrap();
        let graph = MockPackager::new()
            .prod_dependencies(dir.path(), 1, &PackagerOptions::default())
            .unwrap();
        assert_eq!(graph.find_version("uuid"), Some("^9.0.0"));
    }

    #[test]
    fn mock_fails_configured_step() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockPackager::new().failing_on(MockStep::Prune);
        let err = mock
            .prune(dir.path(), &PackagerOptions::default())
            .unwrap_err();
        assert!(matches!(err, PackagerError::Spawn(ref e) if e.message.contains("prune")));
        assert_eq!(mock.calls().len(), 1);
    }

    #[test]
    fn mock_failure_can_be_scoped_to_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad");
        let good = dir.path().join("good");
        let mock = MockPackager::new().failing_in(MockStep::Prune, &bad);
        let options = PackagerOptions::default();
        assert!(mock.prune(&bad, &options).is_err());
        assert!(mock.prune(&good, &options).is_ok());
    }
}
