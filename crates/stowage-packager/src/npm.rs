use crate::backend::{LockfileContents, LockfileFormat, PackagerBackend, PackagerCapabilities};
use crate::classify::{classify_stderr, LinePolicy, StderrRule};
use crate::process::{command_line, executable, run_process, spawn_process};
use crate::PackagerError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use stowage_schema::{rebase_file_protocol, DependencyGraph, DependencyTree, NodeId, PackagerOptions};
use tracing::{debug, info, warn};

const LOCKFILE_NAME: &str = "package-lock.json";

const NPM_STDERR_RULES: &[StderrRule] = &[
    StderrRule::new("npm ERR! extraneous", LinePolicy::Silent),
    StderrRule::new("npm ERR! missing", LinePolicy::Silent),
    StderrRule::new("npm ERR! peer dep missing", LinePolicy::Report),
    StderrRule::new("npm ERR! code ELSPROBLEMS", LinePolicy::Silent),
    StderrRule::new("npm WARN", LinePolicy::Report),
];

pub struct NpmPackager {
    program: String,
}

impl Default for NpmPackager {
    fn default() -> Self {
        Self {
            program: executable("npm"),
        }
    }
}

impl NpmPackager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn list_dependencies(&self, root: &Path, depth: usize) -> Result<DependencyGraph, PackagerError> {
        let depth_arg = format!("--depth={depth}");
        let args = ["ls", "--prod", "--json", depth_arg.as_str()];
        let command = command_line(&self.program, &args);
        let output = run_process(&self.program, &args, root)?;
        let verdict = classify_stderr(&output.stderr, NPM_STDERR_RULES);

        if !output.success && (verdict.is_fatal() || output.stdout.trim().is_empty()) {
            let mut lines = verdict.fatal;
            if lines.is_empty() {
                lines.push(format!("exited with {:?} and no output", output.code));
            }
            return Err(PackagerError::Fatal {
                command,
                stdout: output.stdout,
                stderr: output.stderr,
                lines,
            });
        }
        if verdict.silenced > 0 {
            info!("ignored {} benign npm messages", verdict.silenced);
        }

        let listing: NpmListing =
            serde_json::from_str(&output.stdout).map_err(|e| PackagerError::InvalidOutput {
                command,
                reason: e.to_string(),
            })?;
        let mut graph = DependencyGraph::from_tree(&listing.dependencies);
        graph.problems = verdict.reported;
        Ok(graph)
    }
}

#[derive(Debug, Deserialize)]
struct NpmListing {
    #[serde(default)]
    dependencies: DependencyTree,
}

/// Read the production graph straight from `package-lock.json`.
/// Returns `Ok(None)` for lockfile versions this reader does not handle.
pub fn read_lockfile_graph(path: &Path) -> Result<Option<DependencyGraph>, PackagerError> {
    let lockfile: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    match lockfile.get("lockfileVersion").and_then(Value::as_u64) {
        Some(2) => {
            let dependencies = lockfile
                .get("dependencies")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));
            let tree: DependencyTree = serde_json::from_value(dependencies)?;
            Ok(Some(DependencyGraph::from_tree(&tree)))
        }
        Some(3) => match lockfile.get("packages") {
            Some(Value::Object(packages)) => Ok(Some(graph_from_packages(packages))),
            _ => Ok(Some(DependencyGraph::new())),
        },
        _ => Ok(None),
    }
}

/// Rebuild nesting from the flat v3 `packages` map, where keys are install
/// paths such as `node_modules/a/node_modules/@scope/b`.
fn graph_from_packages(packages: &Map<String, Value>) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    let mut ids: HashMap<&str, NodeId> = HashMap::new();

    let mut paths: Vec<&str> = packages
        .keys()
        .map(String::as_str)
        .filter(|key| key.starts_with("node_modules/"))
        .collect();
    // A parent path is a prefix of its children, so it sorts first.
    paths.sort_unstable();

    for path in paths {
        let entry = &packages[path];
        // devOptional entries are only installed alongside dev dependencies.
        let dev_only = ["dev", "devOptional"]
            .iter()
            .any(|flag| entry.get(*flag).and_then(Value::as_bool) == Some(true));
        if dev_only {
            continue;
        }
        let version = if entry.get("link").and_then(Value::as_bool) == Some(true) {
            entry
                .get("resolved")
                .and_then(Value::as_str)
                .and_then(|target| packages.get(target))
                .and_then(|linked| linked.get("version"))
                .and_then(Value::as_str)
        } else {
            entry.get("version").and_then(Value::as_str)
        };
        let Some(version) = version.filter(|v| !v.is_empty()) else {
            continue;
        };

        let (parent, name) = match path.rfind("/node_modules/") {
            Some(idx) => (Some(&path[..idx]), &path[idx + "/node_modules/".len()..]),
            None => (None, &path["node_modules/".len()..]),
        };
        let id = graph.add_node(name, version);
        ids.insert(path, id);
        match parent {
            Some(parent) => {
                if let Some(parent_id) = ids.get(parent) {
                    graph.add_child(*parent_id, id);
                }
            }
            None => graph.add_root(id),
        }
    }
    graph
}

fn rebase_version_field(path_to_root: &str, entry: &mut Value) {
    if let Some(Value::String(version)) = entry.get_mut("version") {
        if let Some(rebased) = rebase_file_protocol(path_to_root, version) {
            *version = rebased;
        }
    }
}

fn rebase_dependency_tree(path_to_root: &str, dependencies: &mut Value) {
    if let Value::Object(entries) = dependencies {
        for entry in entries.values_mut() {
            rebase_version_field(path_to_root, entry);
            if let Some(nested) = entry.get_mut("dependencies") {
                rebase_dependency_tree(path_to_root, nested);
            }
        }
    }
}

impl PackagerBackend for NpmPackager {
    fn name(&self) -> &'static str {
        "npm"
    }

    fn capabilities(&self) -> PackagerCapabilities {
        PackagerCapabilities {
            lockfile_name: LOCKFILE_NAME,
            lockfile_format: LockfileFormat::Json,
            copy_package_sections: &[],
            must_copy_modules: true,
        }
    }

    fn available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    fn version(&self) -> Result<String, PackagerError> {
        let output = spawn_process(&self.program, &["--version"], Path::new("."))?;
        Ok(output.stdout.trim().to_owned())
    }

    fn prod_dependencies(
        &self,
        root: &Path,
        depth: usize,
        _options: &PackagerOptions,
    ) -> Result<DependencyGraph, PackagerError> {
        let lockfile = root.join(LOCKFILE_NAME);
        if lockfile.is_file() {
            match read_lockfile_graph(&lockfile) {
                Ok(Some(graph)) => {
                    debug!("read {} packages from {}", graph.len(), lockfile.display());
                    return Ok(graph);
                }
                Ok(None) => debug!("unsupported lockfileVersion in {}", lockfile.display()),
                Err(e) => warn!("ignoring unreadable {}: {e}", lockfile.display()),
            }
        }
        self.list_dependencies(root, depth)
    }

    fn rebase_lockfile(
        &self,
        path_to_root: &str,
        contents: LockfileContents,
    ) -> Result<LockfileContents, PackagerError> {
        let LockfileContents::Json(mut lockfile) = contents else {
            return Err(PackagerError::InvalidOutput {
                command: "rebase".to_owned(),
                reason: format!("{LOCKFILE_NAME} must be JSON"),
            });
        };
        if let Some(dependencies) = lockfile.get_mut("dependencies") {
            rebase_dependency_tree(path_to_root, dependencies);
        }
        if let Some(Value::Object(packages)) = lockfile.get_mut("packages") {
            for entry in packages.values_mut() {
                rebase_version_field(path_to_root, entry);
            }
        }
        Ok(LockfileContents::Json(lockfile))
    }

    fn install(&self, cwd: &Path, options: &PackagerOptions) -> Result<(), PackagerError> {
        if options.no_install {
            debug!("no_install set, skipping npm install in {}", cwd.display());
            return Ok(());
        }
        let mut args = vec!["install"];
        if options.ignore_scripts {
            args.push("--ignore-scripts");
        }
        spawn_process(&self.program, &args, cwd)?;
        Ok(())
    }

    fn prune(&self, cwd: &Path, _options: &PackagerOptions) -> Result<(), PackagerError> {
        spawn_process(&self.program, &["prune"], cwd)?;
        Ok(())
    }

    fn run_scripts(&self, cwd: &Path, names: &[String]) -> Result<(), PackagerError> {
        for name in names {
            spawn_process(&self.program, &["run", name.as_str()], cwd)?;
        }
        Ok(())
    }
}
