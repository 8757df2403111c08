use crate::backend::{LockfileContents, LockfileFormat, PackagerBackend, PackagerCapabilities};
use crate::classify::{classify_stderr, LinePolicy, StderrRule};
use crate::process::{command_line, executable, run_process, spawn_process};
use crate::PackagerError;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;
use stowage_schema::{DependencyGraph, NodeId, PackagerOptions};
use tracing::{debug, info};

const LOCKFILE_NAME: &str = "yarn.lock";

const YARN_STDERR_RULES: &[StderrRule] = &[
    StderrRule::new("{\"type\":\"warning\"", LinePolicy::Report),
    StderrRule::new("{\"type\":\"info\"", LinePolicy::Silent),
    StderrRule::new("warning ", LinePolicy::Report),
];

/// `pkg@file:../x`, `pkg@./x` and friends inside `yarn.lock` keys.
static FILE_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^"/]@(?:file:)?)((?:\./|\.\./)[^":,]*?)([":,])"#)
        .expect("file reference pattern is valid")
});

pub struct YarnPackager {
    program: String,
}

impl Default for YarnPackager {
    fn default() -> Self {
        Self {
            program: executable("yarn"),
        }
    }
}

impl YarnPackager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct YarnRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct YarnTreeData {
    #[serde(default)]
    trees: Vec<YarnTreeNode>,
}

#[derive(Debug, Deserialize)]
struct YarnTreeNode {
    name: String,
    #[serde(default)]
    children: Vec<YarnTreeNode>,
}

/// Split `pkg@1.0.0` or `@scope/pkg@1.0.0` into name and version.
fn split_name_version(entry: &str) -> Option<(&str, &str)> {
    let (name, version) = entry.rsplit_once('@')?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name, version))
}

fn insert_node(graph: &mut DependencyGraph, node: &YarnTreeNode) -> Option<NodeId> {
    let (name, version) = split_name_version(&node.name)?;
    let id = graph.add_node(name, version);
    for child in &node.children {
        if let Some(child_id) = insert_node(graph, child) {
            graph.add_child(id, child_id);
        }
    }
    Some(id)
}

/// Parse the JSON-lines output of `yarn list --json`.
pub fn parse_list_output(stdout: &str) -> Result<DependencyGraph, String> {
    let mut graph = DependencyGraph::new();
    let mut problems = Vec::new();
    let mut found_tree = false;

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Ok(record) = serde_json::from_str::<YarnRecord>(line) else {
            continue;
        };
        match record.kind.as_str() {
            "tree" => {
                let data: YarnTreeData =
                    serde_json::from_value(record.data).map_err(|e| e.to_string())?;
                for tree in &data.trees {
                    if let Some(id) = insert_node(&mut graph, tree) {
                        graph.add_root(id);
                    }
                }
                found_tree = true;
            }
            "warning" => {
                if let Some(text) = record.data.as_str() {
                    problems.push(text.to_owned());
                }
            }
            _ => {}
        }
    }

    if !found_tree {
        return Err("no dependency tree in output".to_owned());
    }
    graph.problems = problems;
    Ok(graph)
}

/// Prefix every relative file reference in a `yarn.lock` with `path_to_root`.
pub fn rebase_lockfile_text(path_to_root: &str, lockfile: &str) -> String {
    FILE_REFERENCE_RE
        .replace_all(lockfile, |caps: &Captures<'_>| {
            let rebased = format!("{path_to_root}/{}", &caps[2]).replace('\\', "/");
            format!("{}{rebased}{}", &caps[1], &caps[3])
        })
        .into_owned()
}

impl PackagerBackend for YarnPackager {
    fn name(&self) -> &'static str {
        "yarn"
    }

    fn capabilities(&self) -> PackagerCapabilities {
        PackagerCapabilities {
            lockfile_name: LOCKFILE_NAME,
            lockfile_format: LockfileFormat::Text,
            copy_package_sections: &["resolutions"],
            must_copy_modules: false,
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
        let depth_arg = format!("--depth={depth}");
        let args = ["list", depth_arg.as_str(), "--json", "--production"];
        let command = command_line(&self.program, &args);
        let output = run_process(&self.program, &args, root)?;
        let verdict = classify_stderr(&output.stderr, YARN_STDERR_RULES);

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
            info!("ignored {} benign yarn messages", verdict.silenced);
        }

        let mut graph = parse_list_output(&output.stdout)
            .map_err(|reason| PackagerError::InvalidOutput { command, reason })?;
        graph.problems.extend(verdict.reported);
        Ok(graph)
    }

    fn rebase_lockfile(
        &self,
        path_to_root: &str,
        contents: LockfileContents,
    ) -> Result<LockfileContents, PackagerError> {
        match contents {
            LockfileContents::Text(text) => Ok(LockfileContents::Text(rebase_lockfile_text(
                path_to_root,
                &text,
            ))),
            LockfileContents::Json(_) => Err(PackagerError::InvalidOutput {
                command: "rebase".to_owned(),
                reason: format!("{LOCKFILE_NAME} must be text"),
            }),
        }
    }

    fn install(&self, cwd: &Path, options: &PackagerOptions) -> Result<(), PackagerError> {
        if options.no_install {
            debug!("no_install set, skipping yarn install in {}", cwd.display());
            return Ok(());
        }
        let concurrency;
        let mut args = vec!["install", "--frozen-lockfile", "--non-interactive"];
        if options.ignore_scripts {
            args.push("--ignore-scripts");
        }
        if let Some(n) = options.network_concurrency {
            concurrency = n.to_string();
            args.push("--network-concurrency");
            args.push(&concurrency);
        }
        spawn_process(&self.program, &args, cwd)?;
        Ok(())
    }

    // yarn has no prune; a frozen install removes anything not in the lockfile.
    fn prune(&self, cwd: &Path, options: &PackagerOptions) -> Result<(), PackagerError> {
        self.install(cwd, options)
    }

    fn run_scripts(&self, cwd: &Path, names: &[String]) -> Result<(), PackagerError> {
        for name in names {
            spawn_process(&self.program, &["run", name.as_str()], cwd)?;
        }
        Ok(())
    }
}
