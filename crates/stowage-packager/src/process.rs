use std::fmt::Write as _;
use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// A process that could not be started or exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}{}", render_output(.stdout, .stderr))]
pub struct SpawnError {
    pub message: String,
    pub stdout: String,
    pub stderr: String,
}

fn render_output(stdout: &str, stderr: &str) -> String {
    let mut out = String::new();
    if !stdout.trim().is_empty() {
        let _ = write!(out, "\nstdout:\n{}", stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        let _ = write!(out, "\nstderr:\n{}", stderr.trim_end());
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

/// Platform-specific executable name for a Node.js tool (`npm.cmd` on Windows).
pub fn executable(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.cmd")
    } else {
        name.to_owned()
    }
}

pub fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = program.to_owned();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Run `program` in `cwd` and capture its output. A non-zero exit is not an
/// error here; only failing to start the process is.
pub fn run_process(program: &str, args: &[&str], cwd: &Path) -> Result<ProcessOutput, SpawnError> {
    let line = command_line(program, args);
    debug!("running '{line}' in {}", cwd.display());
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| SpawnError {
            message: format!("failed to start '{line}': {e}"),
            stdout: String::new(),
            stderr: String::new(),
        })?;

    Ok(ProcessOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
        code: output.status.code(),
    })
}

/// Run `program` in `cwd`, rejecting any non-zero exit with the captured output.
pub fn spawn_process(program: &str, args: &[&str], cwd: &Path) -> Result<ProcessOutput, SpawnError> {
    let output = run_process(program, args, cwd)?;
    if output.success {
        return Ok(output);
    }
    let status = output
        .code
        .map_or_else(|| "terminated by signal".to_owned(), |c| format!("exit code {c}"));
    Err(SpawnError {
        message: format!("'{}' failed with {status}", command_line(program, args)),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}
